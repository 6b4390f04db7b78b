//! Integration Test: Separation of Concerns
//!
//! **Policy**: `docchat-core` is a headless library. Terminal handling,
//! argument parsing, log subscribers, and catch-all error types belong to
//! the binary crate.

use std::fs;

use architectural_enforcement::{dependency_names, workspace_root};

const BINARY_ONLY: &[&str] = &[
    "clap",
    "anyhow",
    "tracing-subscriber",
    "crossterm",
    "ratatui",
];

#[test]
fn test_engine_has_no_binary_only_dependencies() {
    let manifest = fs::read_to_string(workspace_root().join("conductor/core/Cargo.toml"))
        .expect("conductor/core/Cargo.toml must exist");
    let names = dependency_names(&manifest);

    assert!(names.iter().any(|n| n == "tokio"), "manifest not parsed: {names:?}");

    let offending: Vec<&String> = names
        .iter()
        .filter(|n| BINARY_ONLY.contains(&n.as_str()))
        .collect();
    assert!(
        offending.is_empty(),
        "docchat-core depends on binary-only crates: {offending:?}"
    );
}

#[test]
fn test_cli_depends_on_engine() {
    let manifest = fs::read_to_string(workspace_root().join("conductor/cli/Cargo.toml"))
        .expect("conductor/cli/Cargo.toml must exist");
    let names = dependency_names(&manifest);
    assert!(names.iter().any(|n| n == "docchat-core"));
}
