//! Integration Test: Core Principles
//!
//! **Policy**: `reporter-core` production code must
//! - propagate errors instead of calling `.unwrap()` / `.expect(`
//! - only sleep inside the send retry loop of `transport/connection.rs`
//! - justify every `unsafe` block with a `// SAFETY:` comment
//! - stay synchronous and never print to stdout/stderr
//!
//! **Exceptions**: Test code (everything after `#[cfg(test)]`, and `tests/`).

use std::fs;

use architectural_enforcement::{
    has_safety_comment, production_lines, rust_sources, violation, workspace_root,
};

const CORE_SRC: &str = "reporter/core/src";

fn report(title: &str, violations: &[String]) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n❌ {title}\n");
    for v in violations {
        eprintln!("  ❌ {v}");
    }
    panic!(
        "\nFound {} violation(s): {title}.\nFix these before merging!",
        violations.len()
    );
}

#[test]
fn test_no_unwrap_in_core_production_code() {
    let mut violations = Vec::new();
    for path in rust_sources(CORE_SRC) {
        for line in production_lines(&path) {
            let code = line.code();
            if code.contains(".unwrap()") || code.contains(".expect(") {
                violations.push(violation(&path, &line));
            }
        }
    }
    report("unwrap/expect in core production code", &violations);
}

#[test]
fn test_sleep_only_in_send_retry_loop() {
    let mut violations = Vec::new();
    for path in rust_sources(CORE_SRC) {
        let allowed = path.ends_with("transport/connection.rs");
        for line in production_lines(&path) {
            let code = line.code();
            if (code.contains("::sleep(") || code.contains(".sleep(")) && !allowed {
                violations.push(violation(&path, &line));
            }
        }
    }
    report("sleep outside the send retry loop", &violations);
}

#[test]
fn test_retry_sleep_is_bounded_by_policy() {
    let path = workspace_root().join(CORE_SRC).join("transport/connection.rs");
    let sleeps: Vec<String> = production_lines(&path)
        .into_iter()
        .filter(|line| line.code().contains("::sleep("))
        .map(|line| line.text.trim().to_string())
        .collect();

    assert_eq!(
        sleeps,
        vec!["thread::sleep(self.policy.retry_interval);".to_string()],
        "the only sleep must wait for the configured retry interval"
    );
}

#[test]
fn test_unsafe_blocks_have_safety_comments() {
    let mut violations = Vec::new();
    for path in rust_sources(CORE_SRC) {
        let lines = production_lines(&path);
        for (idx, line) in lines.iter().enumerate() {
            if line.code().contains("unsafe") && !has_safety_comment(&lines, idx) {
                violations.push(violation(&path, line));
            }
        }
    }
    report("unsafe without a SAFETY comment", &violations);
}

#[test]
fn test_core_does_not_print() {
    let forbidden = ["println!", "eprintln!", "print!", "eprint!", "dbg!"];
    let mut violations = Vec::new();
    for path in rust_sources(CORE_SRC) {
        for line in production_lines(&path) {
            let code = line.code();
            if forbidden.iter().any(|m| code.contains(m)) {
                violations.push(violation(&path, &line));
            }
        }
    }
    report("printing from the core library (use tracing)", &violations);
}

#[test]
fn test_core_has_no_async_runtime() {
    let manifest = workspace_root().join("reporter/core/Cargo.toml");
    let content = fs::read_to_string(&manifest).expect("core manifest readable");

    let runtimes = ["tokio", "async-std", "smol", "futures"];
    let found: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| {
            runtimes
                .iter()
                .find(|rt| line.starts_with(&format!("{rt} ")) || line.starts_with(&format!("{rt}=")))
                .copied()
        })
        .collect();

    assert!(
        found.is_empty(),
        "reporter-core must stay synchronous, found: {found:?}"
    );

    let mut violations = Vec::new();
    for path in rust_sources(CORE_SRC) {
        for line in production_lines(&path) {
            if line.code().contains("async fn") || line.code().contains(".await") {
                violations.push(violation(&path, &line));
            }
        }
    }
    report("async code in the core library", &violations);
}
