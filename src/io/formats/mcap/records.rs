// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! MCAP record parsing.
//!
//! Every record is `opcode: u8`, `length: u64`, then `length` bytes of
//! content. Parsers here take the content slice only, so the same code
//! serves records read from a seekable file, a decompressed chunk, or a
//! forward-only stream.
//!
//! Primitive encodings (little-endian):
//! - string: `u32` byte length + UTF-8 bytes
//! - bytes: `u32` (schema data) or `u64` (chunk records) length + bytes
//! - map: `u32` byte length + packed entries

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::core::{Result, SourceError};
use crate::io::metadata::{Channel, Schema};

use super::constants::{MCAP_MAGIC, OPCODE_LEN_SIZE};

/// Size of a footer record including opcode and length.
pub const FOOTER_RECORD_SIZE: u64 = OPCODE_LEN_SIZE as u64 + 8 + 8 + 4;

/// Footer record followed by the trailing magic.
pub const FOOTER_AND_MAGIC_SIZE: u64 = FOOTER_RECORD_SIZE + MCAP_MAGIC.len() as u64;

/// Footer record: where the summary section lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    /// Offset of the summary section (0 = none)
    pub summary_start: u64,
    /// Offset of the summary offset section (0 = none)
    pub summary_offset_start: u64,
    /// CRC of the summary section (0 = not recorded)
    pub summary_crc: u32,
}

/// Message record content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    /// Channel ID
    pub channel_id: u16,
    /// Sequence number
    pub sequence: u32,
    /// Log timestamp (ns)
    pub log_time: u64,
    /// Publish timestamp (ns)
    pub publish_time: u64,
    /// Payload
    pub data: Vec<u8>,
}

/// Chunk record, borrowing its compressed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord<'a> {
    /// Earliest message log time in the chunk
    pub message_start_time: u64,
    /// Latest message log time in the chunk
    pub message_end_time: u64,
    /// Size of the records once decompressed
    pub uncompressed_size: u64,
    /// CRC32 of the decompressed records (0 = not recorded)
    pub uncompressed_crc: u32,
    /// Compression identifier ("" = none)
    pub compression: String,
    /// Compressed records
    pub records: &'a [u8],
}

/// Chunk index record from the summary section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkIndex {
    /// Earliest message log time in the chunk
    pub message_start_time: u64,
    /// Latest message log time in the chunk
    pub message_end_time: u64,
    /// File offset of the chunk record
    pub chunk_start_offset: u64,
    /// Length of the chunk record including opcode and length
    pub chunk_length: u64,
    /// Channel ID to file offset of its message index record
    pub message_index_offsets: BTreeMap<u16, u64>,
    /// Total length of the message index records after the chunk
    pub message_index_length: u64,
    /// Compression identifier
    pub compression: String,
    /// Size of the compressed records
    pub compressed_size: u64,
    /// Size of the decompressed records
    pub uncompressed_size: u64,
}

impl ChunkIndex {
    /// Whether the chunk's time range intersects `[start, end]`.
    pub fn overlaps(&self, start: u64, end: u64) -> bool {
        self.message_start_time <= end && self.message_end_time >= start
    }

    /// Whether the chunk may hold messages for any of `channel_ids`.
    ///
    /// Without message index offsets nothing can be ruled out.
    pub fn may_contain_any(&self, channel_ids: &std::collections::HashSet<u16>) -> bool {
        self.message_index_offsets.is_empty()
            || channel_ids
                .iter()
                .any(|id| self.message_index_offsets.contains_key(id))
    }
}

/// Statistics record from the summary section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    /// Total messages
    pub message_count: u64,
    /// Number of schemas
    pub schema_count: u16,
    /// Number of channels
    pub channel_count: u32,
    /// Number of attachments
    pub attachment_count: u32,
    /// Number of metadata records
    pub metadata_count: u32,
    /// Number of chunks
    pub chunk_count: u32,
    /// Earliest message log time
    pub message_start_time: u64,
    /// Latest message log time
    pub message_end_time: u64,
    /// Messages per channel
    pub channel_message_counts: BTreeMap<u16, u64>,
}

/// Bounds-checked reader over one record's content.
struct Fields<'a> {
    record: &'static str,
    cursor: Cursor<&'a [u8]>,
}

impl<'a> Fields<'a> {
    fn new(record: &'static str, content: &'a [u8]) -> Self {
        Self {
            record,
            cursor: Cursor::new(content),
        }
    }

    fn err(&self, what: &str) -> SourceError {
        SourceError::malformed(
            self.record,
            None,
            format!("truncated reading {what} at byte {}", self.cursor.position()),
        )
    }

    fn remaining(&self) -> usize {
        self.cursor.get_ref().len() - self.cursor.position() as usize
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        self.cursor.read_u8().map_err(|_| self.err(what))
    }

    fn u16(&mut self, what: &str) -> Result<u16> {
        self.cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| self.err(what))
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        self.cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| self.err(what))
    }

    fn u64(&mut self, what: &str) -> Result<u64> {
        self.cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| self.err(what))
    }

    fn slice(&mut self, len: u64, what: &str) -> Result<&'a [u8]> {
        if len > self.remaining() as u64 {
            return Err(self.err(what));
        }
        let start = self.cursor.position() as usize;
        let end = start + len as usize;
        self.cursor.set_position(end as u64);
        let data: &'a [u8] = *self.cursor.get_ref();
        Ok(&data[start..end])
    }

    fn string(&mut self, what: &str) -> Result<String> {
        let len = self.u32(what)? as u64;
        let bytes = self.slice(len, what)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| {
            SourceError::malformed(self.record, None, format!("invalid UTF-8 in {what}: {e}"))
        })
    }

    fn rest(&mut self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.remaining());
        // Reading the remainder of an in-memory cursor cannot fail.
        let _ = self.cursor.read_to_end(&mut out);
        out
    }

    fn string_map(&mut self, what: &str) -> Result<BTreeMap<String, String>> {
        let len = self.u32(what)? as u64;
        let bytes = self.slice(len, what)?;
        let mut inner = Fields::new(self.record, bytes);
        let mut map = BTreeMap::new();
        while inner.remaining() > 0 {
            let key = inner.string(what)?;
            let value = inner.string(what)?;
            map.insert(key, value);
        }
        Ok(map)
    }

    fn u16_u64_map(&mut self, what: &str) -> Result<BTreeMap<u16, u64>> {
        let len = self.u32(what)? as u64;
        if len % 10 != 0 {
            return Err(SourceError::malformed(
                self.record,
                None,
                format!("{what} byte length {len} is not a multiple of 10"),
            ));
        }
        let bytes = self.slice(len, what)?;
        let mut inner = Fields::new(self.record, bytes);
        let mut map = BTreeMap::new();
        while inner.remaining() > 0 {
            let key = inner.u16(what)?;
            let value = inner.u64(what)?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

/// Parse a footer record's content.
pub fn parse_footer(content: &[u8]) -> Result<Footer> {
    let mut f = Fields::new("Footer", content);
    Ok(Footer {
        summary_start: f.u64("summary_start")?,
        summary_offset_start: f.u64("summary_offset_start")?,
        summary_crc: f.u32("summary_crc")?,
    })
}

/// Parse a schema record's content.
///
/// Returns `None` for the reserved schema ID 0, which writers must not emit
/// but which carries no information either way.
pub fn parse_schema(content: &[u8]) -> Result<Option<Schema>> {
    let mut f = Fields::new("Schema", content);
    let id = f.u16("id")?;
    let name = f.string("name")?;
    let encoding = f.string("encoding")?;
    let data_len = f.u32("data length")? as u64;
    let data = f.slice(data_len, "data")?.to_vec();
    if id == 0 {
        return Ok(None);
    }
    Ok(Some(Schema {
        id,
        name,
        encoding,
        data,
    }))
}

/// Parse a channel record's content.
pub fn parse_channel(content: &[u8]) -> Result<Channel> {
    let mut f = Fields::new("Channel", content);
    let id = f.u16("id")?;
    let schema_id = f.u16("schema_id")?;
    let topic = f.string("topic")?;
    let message_encoding = f.string("message_encoding")?;
    let metadata = f.string_map("metadata")?;
    Ok(Channel {
        id,
        topic,
        message_encoding,
        schema_id,
        metadata,
        message_count: 0,
    })
}

/// Parse a message record's content.
pub fn parse_message(content: &[u8]) -> Result<MessageRecord> {
    let mut f = Fields::new("Message", content);
    Ok(MessageRecord {
        channel_id: f.u16("channel_id")?,
        sequence: f.u32("sequence")?,
        log_time: f.u64("log_time")?,
        publish_time: f.u64("publish_time")?,
        data: f.rest(),
    })
}

/// Parse a message record's header without copying the payload.
pub fn peek_message_time(content: &[u8]) -> Result<(u16, u64)> {
    let mut f = Fields::new("Message", content);
    let channel_id = f.u16("channel_id")?;
    let _sequence = f.u32("sequence")?;
    let log_time = f.u64("log_time")?;
    Ok((channel_id, log_time))
}

/// Parse a chunk record's content.
pub fn parse_chunk(content: &[u8]) -> Result<ChunkRecord<'_>> {
    let mut f = Fields::new("Chunk", content);
    let message_start_time = f.u64("message_start_time")?;
    let message_end_time = f.u64("message_end_time")?;
    let uncompressed_size = f.u64("uncompressed_size")?;
    let uncompressed_crc = f.u32("uncompressed_crc")?;
    let compression = f.string("compression")?;
    let records_len = f.u64("records length")?;
    let records = f.slice(records_len, "records")?;
    Ok(ChunkRecord {
        message_start_time,
        message_end_time,
        uncompressed_size,
        uncompressed_crc,
        compression,
        records,
    })
}

/// Parse a chunk index record's content.
pub fn parse_chunk_index(content: &[u8]) -> Result<ChunkIndex> {
    let mut f = Fields::new("ChunkIndex", content);
    Ok(ChunkIndex {
        message_start_time: f.u64("message_start_time")?,
        message_end_time: f.u64("message_end_time")?,
        chunk_start_offset: f.u64("chunk_start_offset")?,
        chunk_length: f.u64("chunk_length")?,
        message_index_offsets: f.u16_u64_map("message_index_offsets")?,
        message_index_length: f.u64("message_index_length")?,
        compression: f.string("compression")?,
        compressed_size: f.u64("compressed_size")?,
        uncompressed_size: f.u64("uncompressed_size")?,
    })
}

/// Parse a statistics record's content.
pub fn parse_statistics(content: &[u8]) -> Result<Statistics> {
    let mut f = Fields::new("Statistics", content);
    Ok(Statistics {
        message_count: f.u64("message_count")?,
        schema_count: f.u16("schema_count")?,
        channel_count: f.u32("channel_count")?,
        attachment_count: f.u32("attachment_count")?,
        metadata_count: f.u32("metadata_count")?,
        chunk_count: f.u32("chunk_count")?,
        message_start_time: f.u64("message_start_time")?,
        message_end_time: f.u64("message_end_time")?,
        channel_message_counts: f.u16_u64_map("channel_message_counts")?,
    })
}

/// Parse the header record's content into `(profile, library)`.
pub fn parse_header(content: &[u8]) -> Result<(String, String)> {
    let mut f = Fields::new("Header", content);
    let profile = f.string("profile")?;
    let library = f.string("library")?;
    Ok((profile, library))
}

/// One record borrowed out of a byte slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRecord<'a> {
    /// Record opcode
    pub opcode: u8,
    /// Offset of the opcode byte within the iterated slice
    pub offset: u64,
    /// Record content
    pub content: &'a [u8],
}

/// Iterator over consecutive records in a byte slice.
///
/// Yields an error and stops if a record's declared length runs past the
/// end of the slice. A trailing fragment shorter than an opcode and length
/// is also an error.
pub struct RecordIter<'a> {
    data: &'a [u8],
    pos: usize,
    base_offset: u64,
    done: bool,
}

impl<'a> RecordIter<'a> {
    /// Iterate records in `data`; reported offsets are relative to `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base_offset(data, 0)
    }

    /// Iterate records in `data`, reporting offsets shifted by `base_offset`.
    pub fn with_base_offset(data: &'a [u8], base_offset: u64) -> Self {
        Self {
            data,
            pos: 0,
            base_offset,
            done: false,
        }
    }
}

impl<'a> Iterator for RecordIter<'a> {
    type Item = Result<RawRecord<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos == self.data.len() {
            return None;
        }
        let offset = self.base_offset + self.pos as u64;
        let remaining = self.data.len() - self.pos;
        if remaining < OPCODE_LEN_SIZE {
            self.done = true;
            return Some(Err(SourceError::malformed(
                "record",
                Some(offset),
                format!("{remaining} trailing bytes are too short for a record header"),
            )));
        }
        let opcode = self.data[self.pos];
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&self.data[self.pos + 1..self.pos + OPCODE_LEN_SIZE]);
        let len = u64::from_le_bytes(len_bytes);
        let available = (remaining - OPCODE_LEN_SIZE) as u64;
        if len > available {
            self.done = true;
            return Some(Err(SourceError::malformed(
                "record",
                Some(offset),
                format!("opcode {opcode:#04x} declares {len} bytes but only {available} remain"),
            )));
        }
        let start = self.pos + OPCODE_LEN_SIZE;
        let end = start + len as usize;
        self.pos = end;
        Some(Ok(RawRecord {
            opcode,
            offset,
            content: &self.data[start..end],
        }))
    }
}
