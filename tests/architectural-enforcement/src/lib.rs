//! Architectural Enforcement
//!
//! Source scanning helpers for the enforcement tests in `tests/`:
//! - no blocking sleeps in production code
//! - no blocking I/O inside the engine
//! - the engine crate stays free of terminal and binary-only dependencies
//!
//! Production code is everything in a source file before its first
//! `#[cfg(test)]`; test modules sit at the end of each file.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// A rule broken at a specific line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File path relative to the workspace root
    pub path: String,
    /// 1-based line number
    pub line: usize,
    /// Offending line, trimmed
    pub text: String,
    /// Short rule description
    pub rule: &'static str,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} - {}: {}", self.path, self.line, self.rule, self.text)
    }
}

/// A Rust source file in the workspace
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the workspace root, with `/` separators
    pub relative: String,
    /// File contents
    pub content: String,
}

impl SourceFile {
    /// Build from in-memory contents
    pub fn new(relative: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            relative: relative.into(),
            content: content.into(),
        }
    }

    /// Production lines as `(line_number, code)`, comments stripped
    ///
    /// Stops at the first `#[cfg(test)]`.
    pub fn production_lines(&self) -> Vec<(usize, &str)> {
        let mut lines = Vec::new();
        for (idx, line) in self.content.lines().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.starts_with("#[cfg(test)]") {
                break;
            }
            if trimmed.starts_with("//") {
                continue;
            }
            let code = line.split("//").next().unwrap_or(line);
            lines.push((idx + 1, code));
        }
        lines
    }

    /// Whether the file path ends with `suffix`
    pub fn is(&self, suffix: &str) -> bool {
        self.relative.ends_with(suffix)
    }
}

/// Workspace root, two levels above this package
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// All `.rs` files under `dir` (relative to the workspace root)
///
/// Panics if the directory is missing, so a moved crate cannot silently
/// pass every check.
pub fn source_files(dir: &str) -> Vec<SourceFile> {
    let root = workspace_root();
    let base = root.join(dir);
    assert!(base.is_dir(), "{} does not exist", base.display());

    let mut files: Vec<SourceFile> = walkdir::WalkDir::new(&base)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .filter_map(|e| {
            let content = fs::read_to_string(e.path()).ok()?;
            let relative = e
                .path()
                .strip_prefix(&root)
                .unwrap_or(e.path())
                .to_string_lossy()
                .replace('\\', "/");
            Some(SourceFile::new(relative, content))
        })
        .collect();
    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    files
}

/// Collect production lines of `files` that match `forbidden`
pub fn scan<F>(files: &[SourceFile], rule: &'static str, forbidden: F) -> Vec<Violation>
where
    F: Fn(&SourceFile, &str) -> bool,
{
    let mut violations = Vec::new();
    for file in files {
        for (line, code) in file.production_lines() {
            if forbidden(file, code) {
                violations.push(Violation {
                    path: file.relative.clone(),
                    line,
                    text: code.trim().to_string(),
                    rule,
                });
            }
        }
    }
    violations
}

/// Panic with a readable report if there are violations
pub fn assert_clean(title: &str, violations: &[Violation], guidance: &[&str]) {
    if violations.is_empty() {
        return;
    }

    eprintln!("\n❌ {title}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    eprintln!();
    for line in guidance {
        eprintln!("  {line}");
    }

    panic!("\nFound {} violation(s). Fix these before merging!", violations.len());
}

/// Dependency names declared in the `[dependencies]` table of a manifest
pub fn dependency_names(manifest: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut in_dependencies = false;
    for line in manifest.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_dependencies = line == "[dependencies]";
            continue;
        }
        if !in_dependencies || line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((name, _)) = line.split_once('=') {
            names.push(name.trim().to_string());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let file = SourceFile::new(
            "src/lib.rs",
            "use std::fs;\n// std::thread::sleep in a comment\nfn a() {} // trailing\n#[cfg(test)]\nmod tests { use std::fs; }\n",
        );
        let lines = file.production_lines();
        assert_eq!(lines, vec![(1, "use std::fs;"), (3, "fn a() {} ")]);
    }

    #[test]
    fn test_scan_reports_line_numbers() {
        let files = vec![SourceFile::new(
            "conductor/core/src/x.rs",
            "fn ok() {}\nfn bad() { std::thread::sleep(d); }\n",
        )];
        let violations = scan(&files, "sleep", |_, code| code.contains("thread::sleep"));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].line, 2);
        assert_eq!(
            violations[0].to_string(),
            "conductor/core/src/x.rs:2 - sleep: fn bad() { std::thread::sleep(d); }"
        );
    }

    #[test]
    fn test_dependency_names() {
        let manifest = "[package]\nname = \"x\"\n\n[dependencies]\n# Logging\ntracing = \"0.1\"\ntokio = { version = \"1\" }\n\n[dev-dependencies]\ntempfile = \"3\"\n";
        assert_eq!(dependency_names(manifest), vec!["tracing", "tokio"]);
    }
}
