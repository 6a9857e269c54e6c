// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! MCAP format constants.
//!
//! Opcodes and magic bytes as defined by the
//! [MCAP format reference](https://mcap.dev/spec).

/// MCAP file magic bytes (at start and end of file).
pub const MCAP_MAGIC: [u8; 8] = [0x89, 0x4D, 0x43, 0x41, 0x50, 0x30, 0x0D, 0x0A];

/// Opcode (1 byte) plus record length (8 bytes).
pub const OPCODE_LEN_SIZE: usize = 1 + 8;

/// Header record - must be first record after magic.
pub const OP_HEADER: u8 = 0x01;
/// Footer record - contains summary section offsets.
pub const OP_FOOTER: u8 = 0x02;
/// Schema record - defines message schemas.
pub const OP_SCHEMA: u8 = 0x03;
/// Channel record - defines channels/topics.
pub const OP_CHANNEL: u8 = 0x04;
/// Message record - contains message data.
pub const OP_MESSAGE: u8 = 0x05;
/// Chunk record - contains compressed messages.
pub const OP_CHUNK: u8 = 0x06;
/// Message index record - indexes messages within a chunk.
pub const OP_MESSAGE_INDEX: u8 = 0x07;
/// Chunk index record - indexes chunks in summary section.
pub const OP_CHUNK_INDEX: u8 = 0x08;
/// Attachment record - contains file attachments.
pub const OP_ATTACHMENT: u8 = 0x09;
/// Attachment index record - indexes attachments in summary.
pub const OP_ATTACHMENT_INDEX: u8 = 0x0A;
/// Statistics record - contains file-level statistics.
pub const OP_STATISTICS: u8 = 0x0B;
/// Metadata record - contains key-value metadata.
pub const OP_METADATA: u8 = 0x0C;
/// Metadata index record - indexes metadata in summary.
pub const OP_METADATA_INDEX: u8 = 0x0D;
/// Summary offset record - indexes summary section records.
pub const OP_SUMMARY_OFFSET: u8 = 0x0E;
/// Data end record - marks end of data section.
pub const OP_DATA_END: u8 = 0x0F;

/// Human-readable name for an opcode, for log and error messages.
pub fn opcode_name(opcode: u8) -> &'static str {
    match opcode {
        OP_HEADER => "Header",
        OP_FOOTER => "Footer",
        OP_SCHEMA => "Schema",
        OP_CHANNEL => "Channel",
        OP_MESSAGE => "Message",
        OP_CHUNK => "Chunk",
        OP_MESSAGE_INDEX => "MessageIndex",
        OP_CHUNK_INDEX => "ChunkIndex",
        OP_ATTACHMENT => "Attachment",
        OP_ATTACHMENT_INDEX => "AttachmentIndex",
        OP_STATISTICS => "Statistics",
        OP_METADATA => "Metadata",
        OP_METADATA_INDEX => "MetadataIndex",
        OP_SUMMARY_OFFSET => "SummaryOffset",
        OP_DATA_END => "DataEnd",
        _ => "Unknown",
    }
}
