// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! The message iterator contract.
//!
//! Both MCAP readers and the [`McapSource`](crate::io::source::McapSource)
//! facade implement [`MessageSource`], so a player can drive any of them
//! the same way:
//!
//! ```rust,no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use robosource::io::{MessageIteratorArgs, MessageSource, McapSource};
//!
//! let mut source = McapSource::file("recording.mcap");
//! let init = source.initialize()?;
//! println!("{} channels", init.channels.len());
//!
//! for event in source.message_iterator(MessageIteratorArgs::new().topics(["/imu"]))? {
//!     let event = event?;
//!     println!("{} @ {}", event.topic, event.log_time);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;

use crate::core::Result;

use super::metadata::{Initialization, MessageEvent};

/// Lazy, forward-only sequence of messages.
///
/// The iterator owns what it reads from and is `Send`. Dropping it early
/// releases its chunk buffers or stream.
pub trait MessageStream: Iterator<Item = Result<MessageEvent>> + Send {}

impl<T> MessageStream for T where T: Iterator<Item = Result<MessageEvent>> + Send {}

/// Boxed message stream returned by [`MessageSource::message_iterator`].
pub type MessageIterator = Box<dyn MessageStream>;

/// Arguments for [`MessageSource::message_iterator`].
///
/// Time bounds are inclusive nanoseconds; `None` leaves that side open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageIteratorArgs {
    /// Topics to yield; `None` yields every topic
    pub topics: Option<HashSet<String>>,
    /// Earliest log time to yield
    pub start: Option<u64>,
    /// Latest log time to yield
    pub end: Option<u64>,
}

impl MessageIteratorArgs {
    /// All topics, whole time range.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to the given topics.
    pub fn topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = Some(topics.into_iter().map(Into::into).collect());
        self
    }

    /// Set the inclusive start time.
    pub fn start(mut self, start: u64) -> Self {
        self.start = Some(start);
        self
    }

    /// Set the inclusive end time.
    pub fn end(mut self, end: u64) -> Self {
        self.end = Some(end);
        self
    }

    /// Lower bound, defaulting to 0.
    pub fn start_or_min(&self) -> u64 {
        self.start.unwrap_or(0)
    }

    /// Upper bound, defaulting to `u64::MAX`.
    pub fn end_or_max(&self) -> u64 {
        self.end.unwrap_or(u64::MAX)
    }

    /// Whether `log_time` falls inside the bounds.
    pub fn contains_time(&self, log_time: u64) -> bool {
        log_time >= self.start_or_min() && log_time <= self.end_or_max()
    }

    /// Whether `topic` passes the topic filter.
    pub fn wants_topic(&self, topic: &str) -> bool {
        self.topics.as_ref().map_or(true, |t| t.contains(topic))
    }
}

/// Arguments for [`MessageSource::get_backfill_messages`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillArgs {
    /// Topics to look up
    pub topics: HashSet<String>,
    /// Find the latest message at or before this log time
    pub time: u64,
}

impl BackfillArgs {
    /// Create backfill arguments.
    pub fn new<I, S>(topics: I, time: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            topics: topics.into_iter().map(Into::into).collect(),
            time,
        }
    }
}

/// A source of time-ordered messages.
///
/// `initialize` must succeed exactly once before the other operations;
/// calling them earlier fails with
/// [`SourceError::NotInitialized`](crate::core::SourceError::NotInitialized).
pub trait MessageSource: Send {
    /// Discover channels, schemas and the time range.
    fn initialize(&mut self) -> Result<Initialization>;

    /// Start a fresh lazy pass over the messages matching `args`.
    fn message_iterator(&mut self, args: MessageIteratorArgs) -> Result<MessageIterator>;

    /// Latest message per requested topic at or before `args.time`.
    ///
    /// Topics without such a message are absent from the result.
    fn get_backfill_messages(&mut self, args: BackfillArgs) -> Result<Vec<MessageEvent>>;
}
