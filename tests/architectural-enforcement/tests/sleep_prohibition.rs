//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code never blocks a thread with `std::thread::sleep`.
//! Timed behaviour in the engine goes through tokio timers, and only where a
//! delay is the feature itself:
//! - `network/fallback.rs`: simulated service latency
//! - `upload.rs`: holding 100% before reporting completion
//!
//! Periodic work uses `tokio::time::interval`.

use architectural_enforcement::{assert_clean, scan, source_files};

/// Files allowed to await a timed delay
const TIMED_DELAY_ALLOWED: &[&str] = &["src/network/fallback.rs", "src/upload.rs"];

fn is_thread_sleep(code: &str) -> bool {
    code.contains("thread::sleep")
}

fn is_async_sleep(code: &str) -> bool {
    code.contains("time::sleep(") || code.contains("sleep_until(")
}

#[test]
fn test_no_thread_sleep_anywhere() {
    let mut files = source_files("conductor/core/src");
    files.extend(source_files("conductor/cli/src"));

    let violations = scan(&files, "Blocking sleep", |_, code| is_thread_sleep(code));

    assert_clean(
        "Thread sleeps found in production code!",
        &violations,
        &[
            "❌ FORBIDDEN: std::thread::sleep (blocks a runtime worker)",
            "✅ REQUIRED: tokio::time::interval for periodic work, channels for waiting",
        ],
    );
}

#[test]
fn test_async_sleep_only_for_simulated_delays() {
    let files = source_files("conductor/core/src");

    let violations = scan(&files, "Unexpected delay", |file, code| {
        is_async_sleep(code) && !TIMED_DELAY_ALLOWED.iter().any(|f| file.is(f))
    });

    assert_clean(
        "Timed delays found outside the simulation code!",
        &violations,
        &[
            "✅ ACCEPTABLE: fallback latency, upload settle delay, test code",
            "❌ FORBIDDEN: sleeping to wait for an event (await the channel instead)",
        ],
    );
}

#[test]
fn test_cli_never_sleeps() {
    let files = source_files("conductor/cli/src");
    let violations = scan(&files, "Sleep in CLI", |_, code| {
        is_thread_sleep(code) || is_async_sleep(code)
    });

    assert_clean(
        "The CLI must be driven by input and engine events only",
        &violations,
        &["✅ REQUIRED: select over stdin, TurnController::step, and updates"],
    );
}
