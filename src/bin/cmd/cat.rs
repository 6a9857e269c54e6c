// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Cat command - print messages in log-time order.

use clap::Args;

use crate::common::{format_timestamp, parse_timestamp, InputArgs, ProgressBar, Result, SourceArgs};
use robosource::io::TopicFilter;
use robosource::{AccessPath, MessageIteratorArgs, MessageSource};

/// Print messages.
#[derive(Args, Clone, Debug)]
pub struct CatCmd {
    #[command(flatten)]
    input: InputArgs,

    /// Comma-separated topics to print
    #[arg(long, value_delimiter = ',', conflicts_with = "topic_regex")]
    topics: Vec<String>,

    /// Regular expression selecting topics
    #[arg(long)]
    topic_regex: Option<String>,

    /// Earliest log time (seconds, nanoseconds or RFC 3339)
    #[arg(long)]
    start: Option<String>,

    /// Latest log time (seconds, nanoseconds or RFC 3339)
    #[arg(long)]
    end: Option<String>,

    /// Stop after this many messages
    #[arg(short = 'n', long)]
    limit: Option<usize>,

    /// Print payloads as hex
    #[arg(long)]
    hex: bool,
}

impl CatCmd {
    pub fn run(self, args: &SourceArgs) -> Result<()> {
        let mut source = self.input.open(args)?;
        let init = source.initialize()?;

        let filter = if let Some(pattern) = &self.topic_regex {
            TopicFilter::regex(pattern)?
        } else if !self.topics.is_empty() {
            TopicFilter::include(self.topics.iter().cloned())
        } else {
            TopicFilter::All
        };

        // A streaming file can define channels after the first chunk, so a
        // pattern is matched against each message instead of resolved up front.
        let match_each =
            matches!(filter, TopicFilter::Regex(_)) && init.access == AccessPath::Streaming;

        let mut iter_args = MessageIteratorArgs::new();
        if !match_each {
            iter_args.topics = filter.resolve(&init.channels);
        }
        if let Some(start) = &self.start {
            iter_args = iter_args.start(parse_timestamp(start)?);
        }
        if let Some(end) = &self.end {
            iter_args = iter_args.end(parse_timestamp(end)?);
        }

        let progress = ProgressBar::new(source.progress().map_or(0, |p| p.total_size));
        let limit = self.limit.unwrap_or(usize::MAX);
        let mut printed = 0usize;

        for event in source.message_iterator(iter_args)? {
            if printed >= limit {
                break;
            }
            let event = event?;
            if let Some(p) = source.progress() {
                progress.set_position(p.bytes_read);
            }
            if match_each && !filter.should_include(&event.topic) {
                continue;
            }

            if self.hex {
                println!(
                    "{} {} [{}] {}",
                    format_timestamp(event.log_time),
                    event.topic,
                    event.schema_name,
                    hex::encode(&event.data)
                );
            } else {
                println!(
                    "{} {} [{}] {} bytes",
                    format_timestamp(event.log_time),
                    event.topic,
                    event.schema_name,
                    event.len()
                );
            }
            printed += 1;
        }

        progress.finish();
        Ok(())
    }
}
