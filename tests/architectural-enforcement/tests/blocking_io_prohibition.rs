//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: The engine runs on the tokio runtime and must not block it.
//! **Required**: `tokio::fs`, `tokio::net`, and the async `reqwest` client.
//!
//! The CLI owns the terminal and may print, but the raw `std::io` handles
//! (`std::io::stdin()`, `std::io::stdout()`) are only touched from non-async
//! helpers. Input is read through `tokio::io::stdin()`.

use architectural_enforcement::{assert_clean, scan, source_files, SourceFile};

fn blocking_io(code: &str) -> bool {
    code.contains("std::fs")
        || code.contains("std::net")
        || code.contains("std::process::Command")
        || code.contains("reqwest::blocking")
}

#[test]
fn test_no_blocking_io_in_engine() {
    let files = source_files("conductor/core/src");
    let violations = scan(&files, "Blocking I/O", |_, code| blocking_io(code));

    assert_clean(
        "Blocking I/O calls found in the engine!",
        &violations,
        &[
            "❌ FORBIDDEN: std::fs, std::net, std::process::Command, reqwest::blocking",
            "✅ REQUIRED: tokio::fs::read().await, tokio::fs::write().await, reqwest::Client",
        ],
    );
}

#[test]
fn test_no_terminal_io_in_engine() {
    let files = source_files("conductor/core/src");
    let violations = scan(&files, "Terminal I/O", |_, code| {
        code.contains("println!")
            || code.contains("eprintln!")
            || code.contains("print!(")
            || code.contains("io::stdin")
            || code.contains("io::stdout")
    });

    assert_clean(
        "The engine writes to the terminal!",
        &violations,
        &["✅ REQUIRED: send a ChatUpdate or log with tracing"],
    );
}

fn std_stdio(code: &str) -> bool {
    code.contains("std::io::stdout()") || code.contains("std::io::stdin()")
}

/// `std::io::stdin()` or `std::io::stdout()` inside an `async fn` body
fn stdout_in_async(file: &SourceFile) -> Vec<usize> {
    let mut in_async = false;
    let mut hits = Vec::new();
    for (line, code) in file.production_lines() {
        let trimmed = code.trim_start();
        if trimmed.contains("fn ") {
            in_async = trimmed.contains("async fn ");
        }
        if in_async && std_stdio(code) {
            hits.push(line);
        }
    }
    hits
}

#[test]
fn test_cli_stdio_outside_async() {
    let files = source_files("conductor/cli/src");
    let violations = scan(&files, "Blocking I/O in CLI", |_, code| {
        code.contains("reqwest::blocking") || code.contains("std::net")
    });
    assert_clean("Blocking network I/O in the CLI!", &violations, &[]);

    for file in &files {
        let hits = stdout_in_async(file);
        assert!(
            hits.is_empty(),
            "{}: blocking stdio inside async fn at lines {hits:?}; use tokio::io or a sync helper",
            file.relative
        );
    }
}

#[test]
fn test_stdout_detection() {
    let file = SourceFile::new(
        "main.rs",
        "fn flush() {\n    std::io::stdout().flush();\n}\nasync fn run() {\n    std::io::stdout().flush();\n}\n",
    );
    assert_eq!(stdout_in_async(&file), vec![5]);
}

#[test]
fn test_async_stdin_is_allowed() {
    let file = SourceFile::new(
        "main.rs",
        "async fn main() {\n    let lines = BufReader::new(tokio::io::stdin()).lines();\n    println!(\"ready\");\n    let _ = std::io::stdin();\n}\n",
    );
    assert_eq!(stdout_in_async(&file), vec![4]);
}
