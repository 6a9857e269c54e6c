// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! I/O layer for MCAP playback.
//!
//! This module provides the byte sources, the MCAP readers built on them,
//! and the source facade that picks between the readers.

pub mod decompress;
pub mod formats;
pub mod metadata;
pub mod readable;

// Re-exports
pub use decompress::DecompressHandlers;
pub use metadata::{AccessPath, Channel, Initialization, MessageEvent, Schema};
pub use readable::{BytesReadable, FileReadable, Readable, RemoteReadable};

// Message iterator contract
pub mod traits;
pub use traits::{BackfillArgs, MessageIterator, MessageIteratorArgs, MessageSource};

// Filter for topic filtering
pub mod filter;
pub use filter::{ChannelFilter, TopicFilter};

// Source facade with automatic reader selection
pub mod source;
pub use source::{AccessStrategy, DataSource, McapSource, SourceBuilder};
