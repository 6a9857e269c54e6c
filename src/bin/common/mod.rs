// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Common utilities for CLI commands.

use std::io::IsTerminal as _;
use std::path::PathBuf;

use clap::Args;
use tracing_subscriber::EnvFilter;

use robosource::{AccessStrategy, DataSource, McapSource, SourceBuilder, SourceConfig};

pub use anyhow::Result as CliResult;
pub type Result<T = ()> = CliResult<T>;

/// Options shared by every command, parsed from global flags.
#[derive(Debug, Clone)]
pub struct SourceArgs {
    pub config: Option<PathBuf>,
}

/// Input selection shared by every command.
#[derive(Args, Clone, Debug)]
pub struct InputArgs {
    /// Input file path or http(s) URL
    #[arg(value_name = "FILE|URL")]
    pub input: String,

    /// Reader selection: auto, indexed or streaming
    #[arg(long, default_value = "auto")]
    pub strategy: AccessStrategy,

    /// Skip chunk and summary CRC checks
    #[arg(long)]
    pub no_crc: bool,
}

impl InputArgs {
    /// Build an uninitialized source from the flags and optional config file.
    pub fn open(&self, args: &SourceArgs) -> Result<McapSource> {
        let config = match &args.config {
            Some(path) => SourceConfig::from_path(path)?,
            None => SourceConfig::default(),
        };
        let validate = config.validate_crcs && !self.no_crc;

        let source = SourceBuilder::new()
            .source(DataSource::parse(&self.input))
            .config(config)
            .validate_crcs(validate)
            .strategy(self.strategy)
            .build()?;
        Ok(source)
    }
}

/// Install the stderr log subscriber.
///
/// `RUST_LOG` wins over the verbosity flag.
pub fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "robosource=debug",
        _ => "robosource=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Format a duration in nanoseconds to human-readable string.
pub fn format_duration(nanos: u64) -> String {
    let secs = nanos / 1_000_000_000;
    let millis = (nanos % 1_000_000_000) / 1_000_000;

    if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}.{:03}s", secs, millis)
    } else {
        format!("{}ms", millis)
    }
}

/// Format a timestamp in nanoseconds with sub-second precision.
pub fn format_timestamp(nanos: u64) -> String {
    let secs = (nanos / 1_000_000_000) as i64;
    let subsec = (nanos % 1_000_000_000) as u32;

    match chrono::DateTime::<chrono::Utc>::from_timestamp(secs, subsec) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S%.9f UTC").to_string(),
        None => format!("{} ns", nanos),
    }
}

/// Parse a timestamp string to nanoseconds.
///
/// Accepts:
/// - Unix timestamp in seconds: "1234567890"
/// - Unix timestamp in nanoseconds: "1234567890000000000"
/// - RFC 3339: "2023-01-01T00:00:00Z"
pub fn parse_timestamp(s: &str) -> CliResult<u64> {
    if let Ok(n) = s.parse::<u64>() {
        // Below year 3000 in seconds
        return Ok(if n < 32_503_680_000 {
            n * 1_000_000_000
        } else {
            n
        });
    }

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        let nanos = dt
            .timestamp_nanos_opt()
            .ok_or_else(|| anyhow::anyhow!("Timestamp out of range: {s}"))?;
        return u64::try_from(nanos).map_err(|_| anyhow::anyhow!("Timestamp before epoch: {s}"));
    }

    Err(anyhow::anyhow!("Invalid timestamp: {s}"))
}

/// Byte-progress bar for streaming passes; hidden when stderr is not a terminal.
pub struct ProgressBar {
    inner: Option<indicatif::ProgressBar>,
}

impl ProgressBar {
    /// Create a new progress bar over `total` bytes.
    pub fn new(total: u64) -> Self {
        let inner = if std::io::stderr().is_terminal() && total > 0 {
            let pb = indicatif::ProgressBar::new(total);
            if let Ok(style) = indicatif::ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} {msg}")
            {
                pb.set_style(style.progress_chars("=>-"));
            }
            Some(pb)
        } else {
            None
        };

        Self { inner }
    }

    /// Move the bar to `bytes`.
    pub fn set_position(&self, bytes: u64) {
        if let Some(pb) = &self.inner {
            pb.set_position(bytes);
        }
    }

    /// Remove the bar from the terminal.
    pub fn finish(&self) {
        if let Some(pb) = &self.inner {
            pb.finish_and_clear();
        }
    }
}
