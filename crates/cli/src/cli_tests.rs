// SPDX-License-Identifier: MIT

use super::*;
use clap::Parser;

fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
    Cli::try_parse_from(args)
}

#[test]
fn run_requires_script_and_run_id() {
    assert!(parse(&["quarry", "run"]).is_err());
    assert!(parse(&["quarry", "run", "--script", "listing"]).is_err());
    assert!(parse(&["quarry", "run", "--script", "listing", "--run-id", "r1"]).is_ok());
}

#[test]
fn run_parses_full_flag_set() {
    let cli = parse(&[
        "quarry", "run",
        "--script", "listing",
        "--run-id", "r1",
        "--source", "shop",
        "--category", "deep",
        "--storage-backend", "fs",
        "--storage-path", "/tmp/lode",
        "--policy", "streaming",
        "--flush-count", "100",
        "--flush-interval", "5s",
        "--depth", "2",
        "--max-runs", "10",
        "--parallel", "4",
        "--adapter", "webhook",
        "--adapter-url", "https://hooks.example.com/q",
        "--adapter-header", "x-token=abc",
        "--adapter-header", "x-env=prod",
        "--adapter-timeout", "10s",
        "--adapter-retries", "3",
        "--dry-run",
        "--no-browser-reuse",
    ])
    .unwrap();

    let Command::Run(args) = cli.command else { panic!("expected run") };
    assert_eq!(args.script, "listing");
    assert_eq!(args.flush_interval, Some(std::time::Duration::from_secs(5)));
    assert_eq!(args.adapter_header.len(), 2);
    assert_eq!(args.adapter_header[0], ("x-token".to_string(), "abc".to_string()));
    assert!(args.dry_run);
    assert!(args.no_browser_reuse);
}

#[test]
fn invalid_policy_value_is_rejected() {
    assert!(parse(&[
        "quarry", "run", "--script", "s", "--run-id", "r", "--policy", "batchy"
    ])
    .is_err());
}

#[test]
fn read_only_commands_parse() {
    assert!(parse(&["quarry", "list", "runs", "--storage-path", "/tmp/lode"]).is_ok());
    assert!(parse(&["quarry", "stats", "metrics", "--storage-path", "/tmp/lode"]).is_ok());
    assert!(parse(&["quarry", "inspect", "run", "r1", "--storage-path", "/tmp/lode"]).is_ok());
    assert!(parse(&[
        "quarry", "debug", "resolve-proxy", "--config", "/tmp/q.yaml", "--pool", "p"
    ])
    .is_ok());
    assert!(parse(&["quarry", "debug", "ipc", "-"]).is_ok());
    assert!(parse(&["quarry", "version"]).is_ok());
}

#[test]
fn no_daemon_style_commands_exist() {
    for forbidden in ["status", "admin", "control", "serve"] {
        assert!(parse(&["quarry", forbidden]).is_err(), "{forbidden} must not parse");
    }
}

#[test]
fn key_value_parser_accepts_values_with_equals() {
    assert_eq!(
        parse_key_value("k=v=w").unwrap(),
        ("k".to_string(), "v=w".to_string())
    );
    assert!(parse_key_value("no-equals").is_err());
    assert!(parse_key_value("=v").is_err());
}
