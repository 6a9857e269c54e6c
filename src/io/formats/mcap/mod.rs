// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! MCAP format implementation.
//!
//! Two readers share one record parser:
//! - [`IndexedMcapReader`] seeks through the summary section's chunk
//!   indexes and needs a random-access [`Readable`](crate::io::Readable)
//! - [`StreamingMcapReader`] makes a single forward pass over any byte
//!   stream, including files still being written

// Re-export constants at module level for convenience
pub use constants::{
    MCAP_MAGIC, OP_CHANNEL, OP_CHUNK, OP_CHUNK_INDEX, OP_DATA_END, OP_FOOTER, OP_HEADER,
    OP_MESSAGE, OP_SCHEMA, OP_STATISTICS, OP_SUMMARY_OFFSET,
};

pub mod constants;

// Record parsing shared by both readers
pub mod chunk;
pub mod records;

// Summary-driven reader for seekable sources
pub mod indexed;

// Single-pass reader for forward-only streams
pub mod streaming;

// Re-exports
pub use indexed::IndexedMcapReader;
pub use records::{ChunkIndex, Statistics};
pub use streaming::{StreamProgress, StreamingMcapReader};
