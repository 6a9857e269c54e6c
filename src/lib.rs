// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! # Robosource
//!
//! Iterable MCAP playback source for robotics recordings.
//!
//! A source reads an MCAP file from local disk or over HTTP and serves its
//! messages in log-time order:
//! - **Indexed** reading uses the trailing summary to jump straight to the
//!   chunks a request needs ([`io::formats::mcap::indexed`](crate::io::formats::mcap::indexed))
//! - **Streaming** reading walks the file front to back when there is no
//!   usable index ([`io::formats::mcap::streaming`](crate::io::formats::mcap::streaming))
//! - The **source facade** picks one of the two during initialization
//!   ([`io::source`](crate::io::source))
//!
//! ## Architecture
//!
//! - `core/` - Error type and configuration
//! - `io/readable/` - Random-access byte sources (file, HTTP range requests)
//! - `io/decompress.rs` - Chunk decompression registry
//! - `io/formats/mcap/` - Record parsing and the two readers
//! - `io/source/` - Reader selection and fallback
//!
//! ## Example: Playing back a recording
//!
//! ```rust,no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use robosource::{BackfillArgs, McapSource, MessageIteratorArgs, MessageSource};
//!
//! let mut source = McapSource::file("recording.mcap");
//! let init = source.initialize()?;
//! let start = init.start_time.unwrap_or(0);
//!
//! // State of every topic just before playback starts
//! let topics: Vec<String> = init.channels.values().map(|c| c.topic.clone()).collect();
//! let latched = source.get_backfill_messages(BackfillArgs::new(topics, start))?;
//! println!("{} latched messages", latched.len());
//!
//! for event in source.message_iterator(MessageIteratorArgs::new().start(start))? {
//!     let event = event?;
//!     println!("{} @ {}", event.topic, event.log_time);
//! }
//! # Ok(())
//! # }
//! ```

// Core types
pub mod core;

// Re-export core types for convenience
pub use core::{HttpConfig, Result, SourceConfig, SourceError};

// I/O types (readables, readers, source facade)
pub mod io;

// Re-export key I/O types
pub use io::metadata::{AccessPath, Channel, Initialization, MessageEvent, Schema};
pub use io::traits::{BackfillArgs, MessageIterator, MessageIteratorArgs, MessageSource};
pub use io::{
    AccessStrategy, DataSource, DecompressHandlers, McapSource, Readable, SourceBuilder,
};
