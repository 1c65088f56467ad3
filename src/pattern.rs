//! Glob matching with ordered negation.
//!
//! A [`PatternSet`] is an ordered list of globs, each optionally negated with
//! a leading `!`. Matching walks the list left to right and the **last glob
//! that matches decides**: a positive glob includes the path, a negative one
//! excludes it. A path that no positive glob matches is excluded.
//!
//! A list made only of negations (`["!posts/**", "!projects/**"]`) starts from
//! an implicit `**`, so it reads as "everything except".
//!
//! ## Glob Syntax
//!
//! | Glob | Matches |
//! |------|---------|
//! | `*` | any run of characters except `/` |
//! | `**` | any run of characters including `/` |
//! | `**/` | zero or more leading directories |
//! | `?` | one character except `/` |
//! | `[abc]`, `[a-z]`, `[!abc]` | character classes |
//! | `{md,html}` | alternation (not nested) |
//!
//! Globs are compiled to anchored regular expressions once, when the set is
//! built, so a malformed glob fails pipeline construction rather than a build.

use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PatternError {
    #[error("empty glob pattern")]
    Empty,
    #[error("unclosed character class in glob {0:?}")]
    UnclosedClass(String),
    #[error("unclosed alternation in glob {0:?}")]
    UnclosedAlternation(String),
    #[error("nested alternation in glob {0:?}")]
    NestedAlternation(String),
    #[error("invalid glob {glob:?}: {source}")]
    Regex {
        glob: String,
        #[source]
        source: regex::Error,
    },
}

/// A single compiled glob.
#[derive(Debug, Clone)]
pub struct Glob {
    source: String,
    negated: bool,
    regex: Regex,
}

impl Glob {
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let (negated, body) = match pattern.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, pattern),
        };
        if body.is_empty() {
            return Err(PatternError::Empty);
        }
        let translated = glob_to_regex(body)?;
        let regex = Regex::new(&translated).map_err(|source| PatternError::Regex {
            glob: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            source: pattern.to_string(),
            negated,
            regex,
        })
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// The glob as written, including any leading `!`.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the glob body matches, ignoring negation.
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

/// An ordered list of globs evaluated with last-match-wins semantics.
#[derive(Debug, Clone)]
pub struct PatternSet {
    globs: Vec<Glob>,
    implicit_all: bool,
}

impl PatternSet {
    pub fn new<I, S>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let globs = patterns
            .into_iter()
            .map(|p| Glob::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let has_positive = globs.iter().any(|g| !g.negated);
        let has_negative = globs.iter().any(|g| g.negated);
        Ok(Self {
            implicit_all: has_negative && !has_positive,
            globs,
        })
    }

    /// A set matching every path.
    pub fn all() -> Self {
        Self {
            globs: Vec::new(),
            implicit_all: true,
        }
    }

    pub fn is_match(&self, path: &str) -> bool {
        let mut included = self.implicit_all;
        for glob in &self.globs {
            if glob.matches(path) {
                included = !glob.negated;
            }
        }
        included
    }

    pub fn globs(&self) -> &[Glob] {
        &self.globs
    }
}

fn glob_to_regex(glob: &str) -> Result<String, PatternError> {
    let chars: Vec<char> = glob.chars().collect();
    let mut re = String::with_capacity(glob.len() * 2 + 2);
    re.push('^');
    let mut in_alternation = false;
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    while chars.get(i + 1) == Some(&'*') {
                        i += 1;
                    }
                    if chars.get(i + 1) == Some(&'/') {
                        re.push_str("(?:.*/)?");
                        i += 1;
                    } else {
                        re.push_str(".*");
                    }
                } else {
                    re.push_str("[^/]*");
                }
            }
            '?' => re.push_str("[^/]"),
            '[' => {
                let mut j = i + 1;
                let negated = matches!(chars.get(j), Some('!') | Some('^'));
                if negated {
                    j += 1;
                }
                // A `]` right after the opening bracket is literal.
                if chars.get(j) == Some(&']') {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(PatternError::UnclosedClass(glob.to_string()));
                }
                let start = if negated { i + 2 } else { i + 1 };
                // Like `?`, a class never matches `/`. The members are nested
                // as their own class so ranges such as `.-0` stay intact.
                re.push_str(if negated { "[^/[" } else { "[[" });
                for &c in &chars[start..j] {
                    match c {
                        '\\' | '[' | ']' | '&' | '~' | '^' => {
                            re.push('\\');
                            re.push(c);
                        }
                        _ => re.push(c),
                    }
                }
                re.push_str(if negated { "]]" } else { "]&&[^/]]" });
                i = j;
            }
            '{' => {
                if in_alternation {
                    return Err(PatternError::NestedAlternation(glob.to_string()));
                }
                in_alternation = true;
                re.push_str("(?:");
            }
            ',' if in_alternation => re.push('|'),
            '}' if in_alternation => {
                in_alternation = false;
                re.push(')');
            }
            c => re.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
        i += 1;
    }

    if in_alternation {
        return Err(PatternError::UnclosedAlternation(glob.to_string()));
    }
    re.push('$');
    Ok(re)
}
