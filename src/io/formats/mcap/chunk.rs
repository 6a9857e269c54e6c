// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Chunk decoding shared by the indexed and streaming readers.

use crate::core::{Result, SourceError};
use crate::io::decompress::DecompressHandlers;

use super::constants::OP_MESSAGE;
use super::records::{parse_message, peek_message_time, ChunkRecord, MessageRecord, RecordIter};

/// Decompress a chunk's records and verify their CRC.
///
/// The CRC is only checked when `validate_crc` is set and the chunk
/// records a non-zero value.
pub fn decompress_chunk(
    chunk: &ChunkRecord<'_>,
    handlers: &DecompressHandlers,
    validate_crc: bool,
) -> Result<Vec<u8>> {
    let records = handlers.decompress(&chunk.compression, chunk.records, chunk.uncompressed_size)?;
    if validate_crc && chunk.uncompressed_crc != 0 {
        let actual = crc32fast::hash(&records);
        if actual != chunk.uncompressed_crc {
            return Err(SourceError::CrcMismatch {
                expected: chunk.uncompressed_crc,
                actual,
            });
        }
    }
    Ok(records)
}

/// A message decoded out of a chunk, with its offset inside the chunk.
#[derive(Debug, Clone)]
pub struct ChunkMessage {
    /// Offset of the message record within the decompressed records
    pub offset: u64,
    /// The message
    pub message: MessageRecord,
}

/// Collect the messages in decompressed chunk records that satisfy `keep`.
///
/// `keep` sees `(channel_id, log_time)` before the payload is copied.
/// Non-message records are skipped.
pub fn chunk_messages<F>(records: &[u8], mut keep: F) -> Result<Vec<ChunkMessage>>
where
    F: FnMut(u16, u64) -> bool,
{
    let mut out = Vec::new();
    for record in RecordIter::new(records) {
        let record = record?;
        if record.opcode != OP_MESSAGE {
            continue;
        }
        let (channel_id, log_time) = peek_message_time(record.content)?;
        if keep(channel_id, log_time) {
            out.push(ChunkMessage {
                offset: record.offset,
                message: parse_message(record.content)?,
            });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::formats::mcap::constants::OP_CHANNEL;
    use crate::io::formats::mcap::records::tests::{channel_content, message_content, record};

    fn chunk(records: &[u8], crc: u32) -> ChunkRecord<'_> {
        ChunkRecord {
            message_start_time: 0,
            message_end_time: 0,
            uncompressed_size: records.len() as u64,
            uncompressed_crc: crc,
            compression: String::new(),
            records,
        }
    }

    #[test]
    fn test_crc_checked_when_recorded() {
        let data = record(OP_MESSAGE, &message_content(1, 5, b"x"));
        let handlers = DecompressHandlers::default();

        let good = crc32fast::hash(&data);
        assert!(decompress_chunk(&chunk(&data, good), &handlers, true).is_ok());

        let err = decompress_chunk(&chunk(&data, good ^ 1), &handlers, true).unwrap_err();
        assert!(matches!(err, SourceError::CrcMismatch { .. }));

        assert!(decompress_chunk(&chunk(&data, good ^ 1), &handlers, false).is_ok());
        assert!(decompress_chunk(&chunk(&data, 0), &handlers, true).is_ok());
    }

    #[test]
    fn test_chunk_messages_filters_and_skips() {
        let mut data = record(OP_CHANNEL, &channel_content(1, 0, "/a"));
        data.extend(record(OP_MESSAGE, &message_content(1, 10, b"a")));
        data.extend(record(OP_MESSAGE, &message_content(2, 20, b"b")));
        data.extend(record(OP_MESSAGE, &message_content(1, 30, b"c")));

        let msgs = chunk_messages(&data, |channel, _| channel == 1).unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].message.log_time, 10);
        assert_eq!(msgs[1].message.data, b"c");
        assert!(msgs[0].offset < msgs[1].offset);

        let late = chunk_messages(&data, |_, t| t >= 20).unwrap();
        assert_eq!(late.len(), 2);
    }
}
