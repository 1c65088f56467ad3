//! End-to-end builds of the `fixtures/site` example site.
//!
//! Each test copies the fixture into a temp directory, loads its `site.toml`,
//! runs the configured pipeline, and (on success) writes the output, the same
//! sequence the `build` command follows.

use pressroom::config::{self, CONFIG_FILE};
use pressroom::{Build, BuildError, writer};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use walkdir::WalkDir;

fn setup_fixture() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/site");
    copy_dir_recursive(&fixture, tmp.path()).unwrap();
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

fn build_site(root: &Path) -> Result<Build, BuildError> {
    let site_config = config::load_config(&root.join(CONFIG_FILE))?;
    let site = site_config.site(root)?;
    site.build(&site_config.source_dir(root), &site_config.load_options()?)
}

/// Every file under `dir`, keyed by relative path.
fn read_tree(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    WalkDir::new(dir)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(dir).unwrap();
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            (key, fs::read(e.path()).unwrap())
        })
        .collect()
}

fn text(files: &BTreeMap<String, Vec<u8>>, key: &str) -> String {
    String::from_utf8(files[key].clone()).unwrap()
}

// ============================================================================
// Full build
// ============================================================================

#[test]
fn fixture_site_builds_expected_tree() {
    let tmp = setup_fixture();
    let build = build_site(tmp.path()).unwrap();
    let dest = tmp.path().join("build");
    let summary = writer::write(&build.tree, &dest, true).unwrap();

    let files = read_tree(&dest);
    assert_eq!(
        files.keys().map(String::as_str).collect::<Vec<_>>(),
        vec![
            "about.html",
            "blog/2014/Jan/first-post/index.html",
            "blog/2015/Jun/hello-world/index.html",
            "css/site.css",
            "index.html",
            "projects/pressroom/index.html",
            "projects/zine/index.html",
        ]
    );
    assert_eq!(summary.files, 7);
}

#[test]
fn posts_render_through_post_layout() {
    let tmp = setup_fixture();
    let build = build_site(tmp.path()).unwrap();
    let post = build
        .tree
        .get("blog/2015/Jun/hello-world/index.html")
        .unwrap();
    let html = post.text();

    assert_eq!(post.id(), "posts/hello-world.md");
    assert!(html.contains("<title>Hello World | Pressroom Demo</title>"));
    assert!(html.contains("<h1>Hello World</h1>"));
    assert!(html.contains("<time>2015-06-14</time>"));
    assert!(html.contains("<p>It has <em>two</em> paragraphs.</p>"));
    assert!(html.contains("intro, news"));
    assert!(html.contains("<footer>The Pressroom Authors</footer>"));
}

#[test]
fn index_lists_collections_in_sorted_order() {
    let tmp = setup_fixture();
    let build = build_site(tmp.path()).unwrap();
    let index = build.tree.get("index.html").unwrap().text().into_owned();

    let hello = index.find("Hello World").unwrap();
    let first = index.find("First Post").unwrap();
    assert!(hello < first, "newest post should be listed first:\n{index}");

    let pressroom = index.find("<li>Pressroom</li>").unwrap();
    let zine = index.find("<li>Zine</li>").unwrap();
    assert!(pressroom < zine);

    assert!(index.contains("<p>Hello, and welcome to the new blog.</p>"));
    assert!(index.contains("<strong>Pressroom</strong>"));
}

#[test]
fn collections_track_files_across_renames() {
    let tmp = setup_fixture();
    let build = build_site(tmp.path()).unwrap();

    assert_eq!(
        build.context.collection("posts").unwrap(),
        ["posts/hello-world.md", "posts/first-post.md"]
    );
    let (key, _) = build.tree.find_by_id("posts/first-post.md").unwrap();
    assert_eq!(key, "blog/2014/Jan/first-post/index.html");
}

#[test]
fn pages_and_assets_keep_their_paths() {
    let tmp = setup_fixture();
    let build = build_site(tmp.path()).unwrap();

    let about = build.tree.get("about.html").unwrap().text().into_owned();
    assert!(about.contains("<title>About | Pressroom Demo</title>"));
    assert!(about.contains("<h1>About</h1>"));

    let css = build.tree.get("css/site.css").unwrap();
    assert_eq!(
        css.contents,
        fs::read(tmp.path().join("src/css/site.css")).unwrap()
    );
    assert!(build.tree.find_by_id("drafts/unfinished.md").is_none());
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn two_builds_are_byte_identical() {
    let tmp = setup_fixture();
    let first_dest = tmp.path().join("out-1");
    let second_dest = tmp.path().join("out-2");

    writer::write(&build_site(tmp.path()).unwrap().tree, &first_dest, true).unwrap();
    writer::write(&build_site(tmp.path()).unwrap().tree, &second_dest, true).unwrap();

    let first = read_tree(&first_dest);
    let second = read_tree(&second_dest);
    assert_eq!(first.len(), 7);
    assert_eq!(first, second);
    assert!(text(&first, "index.html").contains("Hello World"));
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn permalink_collision_fails_and_writes_nothing() {
    let tmp = setup_fixture();
    let config_path = tmp.path().join(CONFIG_FILE);
    let toml = fs::read_to_string(&config_path)
        .unwrap()
        .replace("pattern = \"blog/:publishDate/:title\"", "pattern = \"blog\"");
    fs::write(&config_path, toml).unwrap();

    let dest = tmp.path().join("build");
    fs::create_dir_all(&dest).unwrap();
    fs::write(dest.join("previous.html"), "old build").unwrap();

    let err = build_site(tmp.path()).unwrap_err();
    match err {
        BuildError::PermalinkCollision { path, first, second } => {
            assert_eq!(path, "blog/index.html");
            assert_eq!(first, "posts/first-post.md");
            assert_eq!(second, "posts/hello-world.md");
        }
        other => panic!("unexpected error: {other}"),
    }

    let files = read_tree(&dest);
    assert_eq!(files.keys().collect::<Vec<_>>(), vec!["previous.html"]);
}

#[test]
fn destination_over_the_site_is_refused() {
    let tmp = setup_fixture();
    let config_path = tmp.path().join(CONFIG_FILE);
    let original = fs::read_to_string(&config_path).unwrap();

    for destination in [".", "src/..", "../"] {
        let toml = original.replace(
            "destination = \"build\"",
            &format!("destination = \"{destination}\""),
        );
        fs::write(&config_path, toml).unwrap();

        let site_config = config::load_config(&config_path).unwrap();
        let source = site_config.source_dir(tmp.path());
        let dest = site_config.destination_dir(tmp.path());
        let err = writer::check_destination(&dest, &[source.as_path(), config_path.as_path()])
            .unwrap_err();
        assert!(matches!(err, writer::WriteError::UnsafeDestination { .. }));
    }
    assert!(tmp.path().join("src/index.md").exists());
    assert!(config_path.exists());
}

#[test]
fn invalid_frontmatter_aborts_before_any_stage() {
    let tmp = setup_fixture();
    fs::write(
        tmp.path().join("src/posts/broken.md"),
        "---\n- not\n- a mapping\n---\nbody",
    )
    .unwrap();
    assert!(matches!(build_site(tmp.path()), Err(BuildError::Load(_))));
}

#[test]
fn mixed_sort_key_types_are_stage_error() {
    let tmp = setup_fixture();
    fs::write(
        tmp.path().join("src/posts/odd.md"),
        "---\ntitle: Odd\npublishDate: someday\n---\nbody",
    )
    .unwrap();
    let err = build_site(tmp.path()).unwrap_err();
    assert!(matches!(err, BuildError::Stage { ref stage, .. } if stage == "collections"));
}
