use clap::{Parser, Subcommand};
use pressroom::{config, logging, output, writer};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "pressroom")]
#[command(about = "Static site builder driven by a composable file-tree pipeline")]
#[command(long_about = "\
Static site builder driven by a composable file-tree pipeline

Every file under the source directory is loaded into an in-memory tree,
run through the stages listed in site.toml, and written to the
destination directory. A failed build writes nothing.

Site structure:

  my-site/
  ├── site.toml                    # Source/destination, metadata, pipeline
  ├── layouts/                     # Templates for the template stage
  │   ├── page.html
  │   └── post.html
  └── src/
      ├── index.md                 # ---\\n title: Home\\n --- frontmatter
      ├── about.md
      ├── posts/
      │   └── hello-world.md       # publishDate: 2015-06-14
      └── css/site.css             # Non-markdown files pass through

Pipeline stages: markdown, excerpts, collections, branch, permalinks,
template. Branches run a nested pipeline over files matching a glob set.

Run 'pressroom gen-config' to generate a documented site.toml.")]
#[command(version)]
struct Cli {
    /// Site config file; relative paths inside it resolve against its directory
    #[arg(long, short, default_value = config::CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Source directory (overrides `source` in the config)
    #[arg(long, global = true)]
    source: Option<PathBuf>,

    /// Output directory (overrides `destination` in the config)
    #[arg(long, global = true)]
    destination: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load, run the pipeline, and write the output
    Build,
    /// Run the pipeline without writing anything
    Check {
        /// Print the final tree and collections as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a stock site.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let site_config = config::load_config(&cli.config)?;
    let base = config_base(&cli.config);
    let source = cli
        .source
        .clone()
        .unwrap_or_else(|| site_config.source_dir(&base));
    let destination = cli
        .destination
        .clone()
        .unwrap_or_else(|| site_config.destination_dir(&base));

    let site = site_config.site(&base)?;
    let options = site_config.load_options()?;

    match cli.command {
        Command::Build => {
            writer::check_destination(&destination, &[source.as_path(), cli.config.as_path()])?;
            println!("==> Building {}", source.display());
            let build = site.build(&source, &options)?;
            output::print_build_output(&build);
            let summary = writer::write(&build.tree, &destination, site_config.clean)?;
            output::print_write_summary(&summary, &destination);
        }
        Command::Check { json } => {
            let build = site.build(&source, &options)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&output::build_json(&build))?);
            } else {
                println!("==> Checking {}", source.display());
                output::print_build_output(&build);
                println!("==> Site is valid");
            }
        }
        Command::GenConfig => {}
    }

    Ok(())
}

/// Directory that relative config paths resolve against.
fn config_base(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
