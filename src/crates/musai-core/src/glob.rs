//! Shell-style glob matching used to select input files under a root directory

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};

/// A compiled glob pattern
///
/// Patterns are matched against paths relative to the search root, with `/` as the
/// separator. `*` and `?` never cross a directory boundary, `**/` matches zero or more
/// directories and `[...]` is a character class.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    pattern: String,
    regex: Regex,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let source = translate(pattern)?;
        let regex = Regex::new(&source).map_err(|e| CoreError::InvalidGlob {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        Ok(GlobPattern {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Whether the pattern spans directories, and the walk must recurse
    fn is_recursive(&self) -> bool {
        self.pattern.contains('/')
    }

    /// Match a `/`-separated relative path
    pub fn matches(&self, relative: &str) -> bool {
        self.regex.is_match(relative)
    }
}

fn translate(pattern: &str) -> Result<String> {
    let mut out = String::from("^");
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    out.push_str("(?:[^/]*/)*");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
                continue;
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|&c| c == ']')
                    .map(|p| p + i + 1)
                    .ok_or_else(|| CoreError::InvalidGlob {
                        pattern: pattern.to_string(),
                        message: "unclosed character class".to_string(),
                    })?;
                let body: String = chars[i + 1..close].iter().collect();
                // Glob negation is `[!...]`, regex wants `[^...]`
                let body = match body.strip_prefix('!') {
                    Some(rest) => format!("^{}", rest),
                    None => body,
                };
                out.push('[');
                out.push_str(&body.replace('\\', "\\\\"));
                out.push(']');
                i = close + 1;
                continue;
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    out.push('$');
    Ok(out)
}

/// Collect every file under `root` matching `pattern`, sorted by path
pub fn collect_files(root: &Path, pattern: &GlobPattern) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(CoreError::PathNotFound(root.to_path_buf()));
    }

    let mut files = Vec::new();
    walk(root, root, pattern, &mut files)?;
    files.sort();
    Ok(files)
}

fn walk(root: &Path, dir: &Path, pattern: &GlobPattern, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            if pattern.is_recursive() {
                walk(root, &path, pattern, files)?;
            }
            continue;
        }

        let relative = match path.strip_prefix(root) {
            Ok(rel) => rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => continue,
        };

        if pattern.matches(&relative) {
            files.push(path);
        }
    }

    Ok(())
}
