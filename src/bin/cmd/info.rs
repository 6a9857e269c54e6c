// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Info command - show channels, schemas and time range.

use clap::Args;
use serde_json::json;

use crate::common::{format_duration, format_timestamp, InputArgs, Result, SourceArgs};
use robosource::{Initialization, MessageSource};

/// Show source information.
#[derive(Args, Clone, Debug)]
pub struct InfoCmd {
    #[command(flatten)]
    input: InputArgs,

    /// Print machine-readable JSON
    #[arg(long)]
    json: bool,
}

impl InfoCmd {
    pub fn run(self, args: &SourceArgs) -> Result<()> {
        let mut source = self.input.open(args)?;
        let init = source.initialize()?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&info_json(&init))?);
        } else {
            print_info(&self.input.input, &init);
        }
        Ok(())
    }
}

fn info_json(init: &Initialization) -> serde_json::Value {
    let channels: Vec<_> = init
        .sorted_channels()
        .into_iter()
        .map(|ch| {
            json!({
                "id": ch.id,
                "topic": ch.topic,
                "message_encoding": ch.message_encoding,
                "schema": init.schema_for(ch).map(|s| s.name.as_str()),
                "message_count": ch.message_count,
            })
        })
        .collect();

    json!({
        "access": init.access,
        "start_time": init.start_time,
        "end_time": init.end_time,
        "message_count": init.message_count,
        "channels": channels,
        "problems": init.problems,
    })
}

fn print_info(input: &str, init: &Initialization) {
    println!("=== {} ===", input);
    println!("Access: {}", init.access);
    println!("Channels: {}", init.channels.len());
    println!("Schemas: {}", init.schemas.len());
    if init.message_count > 0 {
        println!("Messages: {}", init.message_count);
    }

    if let (Some(start), Some(end)) = (init.start_time, init.end_time) {
        println!("Start: {}", format_timestamp(start));
        println!("End: {}", format_timestamp(end));
        println!("Duration: {}", format_duration(init.duration()));
    }

    println!();
    println!("Channels:");
    for ch in init.sorted_channels() {
        let schema = init
            .schema_for(ch)
            .map(|s| s.name.as_str())
            .unwrap_or("(none)");
        println!(
            "  [{}] {} | {} | {} | {} messages",
            ch.id, ch.topic, schema, ch.message_encoding, ch.message_count
        );
    }

    if !init.problems.is_empty() {
        println!();
        println!("Problems:");
        for problem in &init.problems {
            println!("  {}", problem);
        }
    }
}
