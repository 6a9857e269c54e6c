// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! CLI integration tests.
//!
//! These tests run the actual robosource binary and verify its behavior.

mod common;

use std::process::{Command, Output};

use common::{msg, temp_mcap, McapBuilder, TestServer};

const SEC: u64 = 1_000_000_000;

/// Run robosource with arguments
fn run(args: &[&str]) -> Output {
    let bin = env!("CARGO_BIN_EXE_robosource");
    Command::new(bin)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|_| panic!("Failed to run {:?}", bin))
}

/// Run robosource and assert success
fn run_ok(args: &[&str]) -> String {
    let output = run(args);
    assert!(
        output.status.success(),
        "Command failed: {:?}\nstdout: {}\nstderr: {}",
        args,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Run robosource and assert failure
fn run_err(args: &[&str]) -> String {
    let output = run(args);
    assert!(
        !output.status.success(),
        "Command should have failed but succeeded: {:?}",
        args
    );
    String::from_utf8_lossy(&output.stderr).to_string()
}

/// One-second spaced recording starting at t=10s.
fn recording() -> McapBuilder {
    McapBuilder::robot()
        .compression("zstd")
        .chunk(vec![msg(1, 10 * SEC), msg(2, 15 * SEC), msg(1, 20 * SEC)])
        .chunk(vec![msg(3, 25 * SEC), msg(1, 30 * SEC), msg(2, 35 * SEC)])
}

/// Streaming-only recording whose `/tf` channel is defined in the second chunk.
fn late_tf_recording() -> Vec<u8> {
    recording().late_channel(3).without_summary().build()
}

fn topics_of(output: &str) -> Vec<&str> {
    output
        .lines()
        .filter_map(|l| l.split_whitespace().nth(3))
        .collect()
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_cli_help() {
    let output = run_ok(&["--help"]);
    assert!(output.contains("Iterable playback source"));
    assert!(output.contains("info"));
    assert!(output.contains("cat"));
    assert!(output.contains("backfill"));
}

#[test]
fn test_cli_version() {
    let output = run_ok(&["--version"]);
    assert!(output.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_no_args() {
    let output = run(&[]);
    assert!(!output.status.success());
}

#[test]
fn test_cli_invalid_subcommand() {
    let stderr = run_err(&["convert", "a.mcap", "b.mcap"]);
    assert!(stderr.contains("unrecognized subcommand") || stderr.contains("error"));
}

// ============================================================================
// Info
// ============================================================================

#[test]
fn test_info_indexed() {
    let (path, _guard) = temp_mcap("cli_info", &recording().build());
    let output = run_ok(&["info", path.to_str().unwrap()]);
    assert!(output.contains("Access: indexed"));
    assert!(output.contains("Channels: 3"));
    assert!(output.contains("/imu"));
    assert!(output.contains("sensor_msgs/msg/Imu"));
    assert!(output.contains("Duration: 25.000s"), "{output}");
}

#[test]
fn test_info_json() {
    let (path, _guard) = temp_mcap("cli_info_json", &recording().build());
    let output = run_ok(&["info", path.to_str().unwrap(), "--json"]);
    let value: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(value["access"], "indexed");
    assert_eq!(value["start_time"], 10 * SEC);
    assert_eq!(value["end_time"], 35 * SEC);
    assert_eq!(value["message_count"], 6);
    assert_eq!(value["channels"].as_array().unwrap().len(), 3);
    assert_eq!(value["channels"][0]["topic"], "/imu");
}

#[test]
fn test_info_streaming_reports_problem() {
    let bytes = recording().without_summary().build();
    let (path, _guard) = temp_mcap("cli_info_stream", &bytes);
    let output = run_ok(&["info", path.to_str().unwrap()]);
    assert!(output.contains("Access: streaming"));
    assert!(output.contains("Problems:"));
}

#[test]
fn test_info_forced_strategy() {
    let (path, _guard) = temp_mcap("cli_info_forced", &recording().build());
    let output = run_ok(&["info", path.to_str().unwrap(), "--strategy", "streaming"]);
    assert!(output.contains("Access: streaming"));
}

#[test]
fn test_info_nonexistent_file() {
    let stderr = run_err(&["info", "/nonexistent/recording.mcap"]);
    assert!(stderr.contains("Error:"));
}

#[test]
fn test_info_not_mcap() {
    let (path, _guard) = temp_mcap("cli_garbage", b"definitely not a recording");
    let stderr = run_err(&["info", path.to_str().unwrap()]);
    assert!(stderr.contains("magic"), "{stderr}");
}

#[test]
fn test_info_over_http() {
    let server = TestServer::start(recording().build());
    let output = run_ok(&["info", &server.url]);
    assert!(output.contains("Access: indexed"));
    assert!(output.contains("/odom"));
}

// ============================================================================
// Cat
// ============================================================================

#[test]
fn test_cat_all() {
    let (path, _guard) = temp_mcap("cli_cat", &recording().build());
    let output = run_ok(&["cat", path.to_str().unwrap()]);
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 6);
    assert!(lines[0].contains("/imu"));
    assert!(lines[3].contains("/tf"));
}

#[test]
fn test_cat_topics_and_range() {
    let (path, _guard) = temp_mcap("cli_cat_filter", &recording().build());
    let output = run_ok(&[
        "cat",
        path.to_str().unwrap(),
        "--topics",
        "/imu,/tf",
        "--start",
        "20",
        "--end",
        "30",
    ]);
    let topics: Vec<&str> = output
        .lines()
        .filter_map(|l| l.split_whitespace().nth(3))
        .collect();
    assert_eq!(topics, vec!["/imu", "/tf", "/imu"]);
}

#[test]
fn test_cat_topic_regex() {
    let (path, _guard) = temp_mcap("cli_cat_regex", &recording().build());
    let output = run_ok(&["cat", path.to_str().unwrap(), "--topic-regex", "^/(odom|tf)$"]);
    assert_eq!(output.lines().count(), 3);
    assert!(!output.contains("/imu"));
}

#[test]
fn test_cat_topic_regex_finds_late_channel() {
    let (path, _guard) = temp_mcap("cli_cat_late_regex", &late_tf_recording());
    let by_regex = run_ok(&["cat", path.to_str().unwrap(), "--topic-regex", "^/tf$"]);
    let by_name = run_ok(&["cat", path.to_str().unwrap(), "--topics", "/tf"]);
    assert_eq!(topics_of(&by_regex), vec!["/tf"]);
    assert_eq!(by_regex, by_name);
}

#[test]
fn test_cat_topic_regex_limit_counts_matches_only() {
    let (path, _guard) = temp_mcap("cli_cat_late_limit", &late_tf_recording());
    let output = run_ok(&[
        "cat",
        path.to_str().unwrap(),
        "--topic-regex",
        "^/(tf|odom)$",
        "-n",
        "2",
    ]);
    assert_eq!(topics_of(&output), vec!["/odom", "/tf"]);
}

#[test]
fn test_cat_limit_and_hex() {
    let (path, _guard) = temp_mcap("cli_cat_hex", &recording().build());
    let output = run_ok(&["cat", path.to_str().unwrap(), "-n", "1", "--hex"]);
    assert_eq!(output.lines().count(), 1);
    let payload = format!("1@{}", 10 * SEC);
    assert!(output.contains(&hex::encode(payload)), "{output}");
}

#[test]
fn test_cat_invalid_regex() {
    let (path, _guard) = temp_mcap("cli_cat_bad_regex", &recording().build());
    run_err(&["cat", path.to_str().unwrap(), "--topic-regex", "("]);
}

#[test]
fn test_cat_topics_conflict_with_regex() {
    run_err(&["cat", "x.mcap", "--topics", "/imu", "--topic-regex", "imu"]);
}

// ============================================================================
// Backfill
// ============================================================================

#[test]
fn test_backfill_indexed() {
    let (path, _guard) = temp_mcap("cli_backfill", &recording().build());
    let output = run_ok(&["backfill", path.to_str().unwrap(), "--time", "27"]);
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 3, "{output}");
    assert!(lines.iter().any(|l| l.contains("/imu")));
    assert!(lines.iter().any(|l| l.contains("/tf")));
}

#[test]
fn test_backfill_streaming() {
    let bytes = recording().without_summary().build();
    let (path, _guard) = temp_mcap("cli_backfill_stream", &bytes);
    let output = run_ok(&[
        "backfill",
        path.to_str().unwrap(),
        "--time",
        "27",
        "--topics",
        "/odom",
    ]);
    assert_eq!(output.lines().count(), 1, "{output}");
    assert!(output.contains("/odom"));
}

#[test]
fn test_backfill_streaming_all_topics_includes_late_channel() {
    let (path, _guard) = temp_mcap("cli_backfill_late", &late_tf_recording());
    let output = run_ok(&["backfill", path.to_str().unwrap(), "--time", "32"]);
    let mut topics = topics_of(&output);
    topics.sort();
    assert_eq!(topics, vec!["/imu", "/odom", "/tf"], "{output}");
}

#[test]
fn test_backfill_before_first_message() {
    let (path, _guard) = temp_mcap("cli_backfill_early", &recording().build());
    let output = run_ok(&["backfill", path.to_str().unwrap(), "--time", "5"]);
    assert!(output.contains("No messages"));
}
