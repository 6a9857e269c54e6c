// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Backfill command - latest message per topic at or before a time.

use clap::Args;

use crate::common::{format_timestamp, parse_timestamp, InputArgs, Result, SourceArgs};
use robosource::{AccessPath, BackfillArgs, MessageIteratorArgs, MessageSource};

/// Show backfill messages.
#[derive(Args, Clone, Debug)]
pub struct BackfillCmd {
    #[command(flatten)]
    input: InputArgs,

    /// Point in time (seconds, nanoseconds or RFC 3339); defaults to the end of the recording
    #[arg(long)]
    time: Option<String>,

    /// Comma-separated topics to look up; all topics if omitted
    #[arg(long, value_delimiter = ',')]
    topics: Vec<String>,
}

impl BackfillCmd {
    pub fn run(self, args: &SourceArgs) -> Result<()> {
        let mut source = self.input.open(args)?;
        let init = source.initialize()?;

        let time = match &self.time {
            Some(t) => parse_timestamp(t)?,
            None => init.end_time.unwrap_or(u64::MAX),
        };
        // The streaming reader only knows what an earlier pass has seen, and
        // channels defined late in the file only show up during that pass.
        if init.access == AccessPath::Streaming {
            let mut pass = MessageIteratorArgs::new().end(time);
            if !self.topics.is_empty() {
                pass = pass.topics(self.topics.iter().cloned());
            }
            for event in source.message_iterator(pass)? {
                event?;
            }
        }

        let topics: Vec<String> = if self.topics.is_empty() {
            source.channels().into_iter().map(|c| c.topic).collect()
        } else {
            self.topics.clone()
        };

        let events = source.get_backfill_messages(BackfillArgs::new(topics, time))?;
        if events.is_empty() {
            println!("No messages at or before {}", format_timestamp(time));
        }
        for event in events {
            println!(
                "{} {} [{}] {} bytes",
                format_timestamp(event.log_time),
                event.topic,
                event.schema_name,
                event.len()
            );
        }
        Ok(())
    }
}
