// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Metadata types shared by the indexed and streaming readers.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;

/// A message type definition.
///
/// Channels reference schemas by id; one schema may back several channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Schema ID (never 0; 0 means "no schema" on a channel)
    pub id: u16,
    /// Type name (e.g. "sensor_msgs/msg/Imu")
    pub name: String,
    /// Schema encoding (e.g. "ros2msg", "protobuf", "jsonschema")
    pub encoding: String,
    /// Raw definition bytes
    pub data: Vec<u8>,
}

impl Schema {
    /// Create a new schema.
    pub fn new(
        id: u16,
        name: impl Into<String>,
        encoding: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            encoding: encoding.into(),
            data: data.into(),
        }
    }

    /// The definition as text, if it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

/// A named, schema-typed stream of messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Channel {
    /// Channel ID, unique within one source
    pub id: u16,
    /// Topic name (e.g. "/imu")
    pub topic: String,
    /// Message encoding (e.g. "cdr", "json")
    pub message_encoding: String,
    /// Referenced schema ID (0 = schemaless)
    pub schema_id: u16,
    /// Free-form channel metadata
    pub metadata: BTreeMap<String, String>,
    /// Message count from file statistics (0 if unknown)
    pub message_count: u64,
}

impl Channel {
    /// Create a new channel.
    pub fn new(
        id: u16,
        topic: impl Into<String>,
        message_encoding: impl Into<String>,
        schema_id: u16,
    ) -> Self {
        Self {
            id,
            topic: topic.into(),
            message_encoding: message_encoding.into(),
            schema_id,
            metadata: BTreeMap::new(),
            message_count: 0,
        }
    }

    /// Set the message count.
    pub fn with_message_count(mut self, count: u64) -> Self {
        self.message_count = count;
        self
    }
}

/// One message, resolved against its channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    /// Topic of the channel the message was published on
    pub topic: String,
    /// Channel ID
    pub channel_id: u16,
    /// Schema name of the channel, empty if schemaless
    pub schema_name: String,
    /// Log timestamp (nanoseconds since Unix epoch)
    pub log_time: u64,
    /// Publish timestamp (nanoseconds since Unix epoch)
    pub publish_time: u64,
    /// Per-channel sequence number written by the recorder
    pub sequence: u32,
    /// Raw message bytes
    pub data: Vec<u8>,
}

impl MessageEvent {
    /// Size of the payload in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Which reader ended up serving a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessPath {
    /// Direct chunk access through the trailing index
    Indexed,
    /// Single forward pass over the byte stream
    Streaming,
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessPath::Indexed => write!(f, "indexed"),
            AccessPath::Streaming => write!(f, "streaming"),
        }
    }
}

/// Everything the player needs to build its topic catalog.
///
/// Computed once by `initialize` and never changed afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Initialization {
    /// Channels by ID
    pub channels: HashMap<u16, Channel>,
    /// Schemas by ID
    pub schemas: HashMap<u16, Schema>,
    /// Earliest message log time, if known
    pub start_time: Option<u64>,
    /// Latest message log time, if known
    pub end_time: Option<u64>,
    /// Total message count (0 if unknown)
    pub message_count: u64,
    /// Reader that serves this source
    pub access: AccessPath,
    /// Non-fatal problems found while initializing
    pub problems: Vec<String>,
}

impl Initialization {
    pub(crate) fn empty(access: AccessPath) -> Self {
        Self {
            channels: HashMap::new(),
            schemas: HashMap::new(),
            start_time: None,
            end_time: None,
            message_count: 0,
            access,
            problems: Vec::new(),
        }
    }

    /// Channels sorted by ID.
    pub fn sorted_channels(&self) -> Vec<&Channel> {
        let mut channels: Vec<_> = self.channels.values().collect();
        channels.sort_by_key(|c| c.id);
        channels
    }

    /// Schema referenced by a channel, if any.
    pub fn schema_for(&self, channel: &Channel) -> Option<&Schema> {
        self.schemas.get(&channel.schema_id)
    }

    /// Duration covered, in nanoseconds.
    pub fn duration(&self) -> u64 {
        match (self.start_time, self.end_time) {
            (Some(s), Some(e)) if e > s => e - s,
            _ => 0,
        }
    }
}

/// Resolve a message against known channels and schemas.
pub(crate) fn resolve_event(
    channel: &Channel,
    schemas: &HashMap<u16, Schema>,
    message: crate::io::formats::mcap::records::MessageRecord,
) -> MessageEvent {
    MessageEvent {
        topic: channel.topic.clone(),
        channel_id: channel.id,
        schema_name: schemas
            .get(&channel.schema_id)
            .map(|s| s.name.clone())
            .unwrap_or_default(),
        log_time: message.log_time,
        publish_time: message.publish_time,
        sequence: message.sequence,
        data: message.data,
    }
}
