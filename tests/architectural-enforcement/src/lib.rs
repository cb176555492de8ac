//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural
//! principles of the reporter workspace:
//! - No panicking shortcuts in core production code
//! - Sleeping confined to the send retry loop
//! - Every `unsafe` block justified by a `// SAFETY:` comment
//! - A synchronous, silent core (no async runtime, no printing)
//!
//! The helpers below scan source text; they are deliberately line-based and
//! treat everything from the first `#[cfg(test)]` onward as test code.

use std::fs;
use std::path::{Path, PathBuf};

/// Workspace root, two levels above this package
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// All `.rs` files under `dir` (relative to the workspace root), sorted
#[must_use]
pub fn rust_sources(dir: &str) -> Vec<PathBuf> {
    let root = workspace_root().join(dir);
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(&root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// A production source line with its 1-based line number
#[derive(Debug, Clone)]
pub struct SourceLine {
    /// 1-based line number
    pub number: usize,
    /// Full line text
    pub text: String,
}

impl SourceLine {
    /// The line with any trailing `//` comment removed; empty for comment lines
    #[must_use]
    pub fn code(&self) -> &str {
        self.text.split("//").next().unwrap_or("")
    }

    /// Whether the line is a comment (regular or doc)
    #[must_use]
    pub fn is_comment(&self) -> bool {
        self.text.trim_start().starts_with("//")
    }
}

/// Lines of `path` up to (excluding) the first `#[cfg(test)]`
#[must_use]
pub fn production_lines(path: &Path) -> Vec<SourceLine> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };
    content
        .lines()
        .take_while(|line| !line.trim_start().starts_with("#[cfg(test)]"))
        .enumerate()
        .map(|(idx, text)| SourceLine {
            number: idx + 1,
            text: text.to_string(),
        })
        .collect()
}

/// Format a violation the same way for every check
#[must_use]
pub fn violation(path: &Path, line: &SourceLine) -> String {
    let root = workspace_root();
    let shown = path.strip_prefix(&root).unwrap_or(path);
    format!("{}:{} - {}", shown.display(), line.number, line.text.trim())
}

/// Whether the comment block directly above `idx` contains `// SAFETY:`
#[must_use]
pub fn has_safety_comment(lines: &[SourceLine], idx: usize) -> bool {
    for line in lines[..idx].iter().rev() {
        if !line.is_comment() {
            return false;
        }
        if line.text.contains("SAFETY:") {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(src: &[&str]) -> Vec<SourceLine> {
        src.iter()
            .enumerate()
            .map(|(idx, text)| SourceLine {
                number: idx + 1,
                text: (*text).to_string(),
            })
            .collect()
    }

    #[test]
    fn test_safety_comment_detection() {
        let src = lines(&[
            "fn f() {",
            "    // SAFETY: no pointers.",
            "    // Second line.",
            "    let x = unsafe { g() };",
            "    let y = unsafe { h() };",
            "}",
        ]);
        assert!(has_safety_comment(&src, 3));
        assert!(!has_safety_comment(&src, 4));
    }

    #[test]
    fn test_code_strips_comments() {
        let line = SourceLine {
            number: 1,
            text: "let a = 1; // .unwrap() here is prose".to_string(),
        };
        assert!(!line.code().contains("unwrap"));
        assert!(!line.is_comment());
    }

    #[test]
    fn test_core_sources_found() {
        let files = rust_sources("reporter/core/src");
        assert!(files.iter().any(|p| p.ends_with("transport/connection.rs")));
    }
}
