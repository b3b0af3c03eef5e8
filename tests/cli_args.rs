//! Integration tests for the quotecache binary
//!
//! Each test gets its own cache directory, so runs never share state.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

/// Helper to run the CLI against `cache_dir` with given args and capture output
fn run_cli(cache_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_quotecache"))
        .arg("--cache-dir")
        .arg(cache_dir)
        .args(args)
        .output()
        .expect("Failed to execute quotecache")
}

fn run_cli_with_stdin(cache_dir: &Path, args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_quotecache"))
        .arg("--cache-dir")
        .arg(cache_dir)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to execute quotecache");
    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(stdin.as_bytes())
        .expect("Failed to write stdin");
    child.wait_with_output().expect("Failed to wait for quotecache")
}

fn stats_json(cache_dir: &Path) -> serde_json::Value {
    let output = run_cli(cache_dir, &["stats"]);
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).expect("stats prints JSON")
}

#[test]
fn test_help_flag_exits_successfully() {
    let output = Command::new(env!("CARGO_BIN_EXE_quotecache"))
        .arg("--help")
        .output()
        .expect("Failed to execute quotecache");
    assert!(output.status.success(), "Expected --help to exit successfully");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("quotecache"), "Help should mention quotecache");
    assert!(stdout.contains("parse-quotes"), "Help should list subcommands");
}

#[test]
fn test_put_then_get_across_runs() {
    let dir = TempDir::new().unwrap();

    let put = run_cli(dir.path(), &["put", "quote:AAPL", r#"{"price": 190.5}"#]);
    assert!(put.status.success());
    assert!(String::from_utf8_lossy(&put.stdout).contains("disk"));

    let get = run_cli(dir.path(), &["get", "quote:AAPL"]);
    assert!(get.status.success());
    let value: serde_json::Value = serde_json::from_slice(&get.stdout).unwrap();
    assert_eq!(value, serde_json::json!({"price": 190.5}));
}

#[test]
fn test_get_miss_exits_with_failure() {
    let dir = TempDir::new().unwrap();

    let output = run_cli(dir.path(), &["get", "quote:NOPE"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("quote:NOPE"));
}

#[test]
fn test_invalid_tier_prints_error_and_exits() {
    let dir = TempDir::new().unwrap();

    let output = run_cli(dir.path(), &["put", "k", "1", "--tier", "tape"]);

    assert!(!output.status.success(), "Expected invalid tier to fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("tape"), "Should name the bad tier: {}", stderr);
}

#[test]
fn test_invalid_json_is_rejected() {
    let dir = TempDir::new().unwrap();

    let output = run_cli(dir.path(), &["put", "k", "{not json"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("JSON"));
}

#[test]
fn test_stats_reports_persisted_entries() {
    let dir = TempDir::new().unwrap();
    assert!(run_cli(dir.path(), &["put", "historical:AAPL", "[1,2,3]"]).status.success());
    assert!(run_cli(dir.path(), &["put", "quote:AAPL", "1"]).status.success());

    let stats = stats_json(dir.path());

    assert_eq!(stats["archive"]["entry_count"], 1);
    assert_eq!(stats["disk"]["entry_count"], 1);
    assert_eq!(stats["memory"]["entry_count"], 0);
}

#[test]
fn test_remove_and_clear() {
    let dir = TempDir::new().unwrap();
    assert!(run_cli(dir.path(), &["put", "quote:AAPL", "1"]).status.success());
    assert!(run_cli(dir.path(), &["put", "historical:AAPL", "2"]).status.success());

    assert!(run_cli(dir.path(), &["remove", "quote:AAPL"]).status.success());
    // Removing again is not an error
    assert!(run_cli(dir.path(), &["remove", "quote:AAPL"]).status.success());
    assert_eq!(run_cli(dir.path(), &["get", "quote:AAPL"]).status.code(), Some(1));

    assert!(run_cli(dir.path(), &["clear"]).status.success());
    assert_eq!(stats_json(dir.path())["archive"]["entry_count"], 0);
}

#[test]
fn test_cleanup_prints_report() {
    let dir = TempDir::new().unwrap();

    let output = run_cli(dir.path(), &["cleanup"]);

    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["compacted"], 0);
    assert_eq!(report["disk"]["expired"], 0);
}

#[test]
fn test_parse_quotes_caches_and_reports_status() {
    let dir = TempDir::new().unwrap();

    let output = run_cli_with_stdin(
        dir.path(),
        &["parse-quotes"],
        "AAPL,190.5,188.0\nmsft,FETCH_FAILED\ngarbage\n",
    );

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("AAPL\tFresh\t190.50"), "stdout: {}", stdout);
    assert!(stdout.contains("MSFT\tFailed Recently\t-"), "stdout: {}", stdout);

    let get = run_cli(dir.path(), &["get", "quote:AAPL"]);
    assert!(get.status.success());
    let quote: serde_json::Value = serde_json::from_slice(&get.stdout).unwrap();
    assert_eq!(quote["symbol"], "AAPL");
}

#[test]
fn test_missing_config_file_fails() {
    let dir = TempDir::new().unwrap();

    let output = run_cli(dir.path(), &["--config", "/nonexistent/quotecache.toml", "stats"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("config"));
}

#[cfg(test)]
mod unit_tests {
    //! Unit tests for CLI parsing that don't require running the binary

    use clap::Parser;
    use quotecache::cache::TierKind;
    use quotecache::cli::{parse_tier_arg, Cli, Command};

    #[test]
    fn test_cli_parses_get() {
        let cli = Cli::parse_from(["quotecache", "get", "quote:AAPL"]);
        assert_eq!(
            cli.command,
            Command::Get {
                key: "quote:AAPL".to_string()
            }
        );
        assert!(cli.cache_dir.is_none());
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["quotecache"]).is_err());
    }

    #[test]
    fn test_parse_tier_arg_accepts_mem_alias() {
        assert_eq!(parse_tier_arg("mem").unwrap(), TierKind::Memory);
    }
}
