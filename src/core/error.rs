// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Error types for robosource.
//!
//! Errors fall into a few families:
//! - Unreachable sources (permission, missing file, HTTP failures)
//! - Structural problems in the log (magic, footer, index, records)
//! - Chunk-level failures (compression, CRC)
//! - Caller bugs (iterating before initialization)

use std::fmt;

/// Errors that can occur while reading an MCAP source.
#[derive(Debug, Clone)]
pub enum SourceError {
    /// The backing file exists but cannot be read by this process
    AccessDenied {
        /// Path of the file
        path: String,
    },

    /// The backing file does not exist
    NotFound {
        /// Path of the file
        path: String,
    },

    /// A remote resource could not be reached or answered with an error status
    Unreachable {
        /// URL of the resource
        url: String,
        /// What went wrong
        reason: String,
    },

    /// A remote resource did not declare its length
    MissingLength {
        /// URL of the resource
        url: String,
    },

    /// A remote resource does not support byte-range requests
    RangeNotSupported {
        /// URL of the resource
        url: String,
    },

    /// Generic I/O failure
    Io {
        /// Where the failure happened
        context: String,
        /// Error message
        message: String,
    },

    /// Leading or trailing magic bytes do not match
    InvalidMagic {
        /// Hex dump of the bytes found
        found: String,
    },

    /// Summary/index structures are inconsistent
    InvalidIndex {
        /// What is inconsistent
        reason: String,
    },

    /// A record could not be parsed
    MalformedRecord {
        /// Record kind (e.g. "Chunk", "Message")
        record: String,
        /// Byte offset of the record, if known
        offset: Option<u64>,
        /// Error message
        message: String,
    },

    /// Chunk compressed with an identifier no handler is registered for
    UnsupportedCompression {
        /// Compression identifier
        compression: String,
    },

    /// A registered handler failed to decompress a chunk
    Decompression {
        /// Compression identifier
        compression: String,
        /// Error message
        message: String,
    },

    /// Chunk content does not match its recorded CRC
    CrcMismatch {
        /// CRC recorded in the file
        expected: u32,
        /// CRC computed from the data
        actual: u32,
    },

    /// A message referenced a channel that was never declared
    UnknownChannel {
        /// Channel ID
        channel_id: u16,
    },

    /// A read went past the end of the readable
    OutOfBounds {
        /// Requested offset
        offset: u64,
        /// Requested length
        length: u64,
        /// Size of the readable
        size: u64,
    },

    /// The forward-only stream was already drained by an earlier pass
    StreamConsumed,

    /// An operation was called before `initialize` completed
    NotInitialized {
        /// Operation that was attempted
        operation: String,
    },

    /// `initialize` was called a second time
    AlreadyInitialized,

    /// Configuration could not be loaded or is invalid
    InvalidConfig {
        /// Error message
        message: String,
    },
}

impl SourceError {
    /// Create an I/O error with context.
    pub fn io(context: impl Into<String>, message: impl Into<String>) -> Self {
        SourceError::Io {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create an invalid index error.
    pub fn invalid_index(reason: impl Into<String>) -> Self {
        SourceError::InvalidIndex {
            reason: reason.into(),
        }
    }

    /// Create a malformed record error.
    pub fn malformed(
        record: impl Into<String>,
        offset: Option<u64>,
        message: impl Into<String>,
    ) -> Self {
        SourceError::MalformedRecord {
            record: record.into(),
            offset,
            message: message.into(),
        }
    }

    /// Create an invalid magic error from the bytes found.
    pub fn invalid_magic(found: &[u8]) -> Self {
        SourceError::InvalidMagic {
            found: hex::encode(found),
        }
    }

    /// Create an unreachable-source error.
    pub fn unreachable(url: impl Into<String>, reason: impl Into<String>) -> Self {
        SourceError::Unreachable {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a decompression error.
    pub fn decompression(compression: impl Into<String>, message: impl Into<String>) -> Self {
        SourceError::Decompression {
            compression: compression.into(),
            message: message.into(),
        }
    }

    /// Create a not-initialized error for the named operation.
    pub fn not_initialized(operation: impl Into<String>) -> Self {
        SourceError::NotInitialized {
            operation: operation.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        SourceError::InvalidConfig {
            message: message.into(),
        }
    }

    /// Attach a record offset to a malformed-record error that has none.
    pub fn at_offset(self, at: u64) -> Self {
        match self {
            SourceError::MalformedRecord {
                record,
                offset: None,
                message,
            } => SourceError::MalformedRecord {
                record,
                offset: Some(at),
                message,
            },
            other => other,
        }
    }

    /// Whether this error describes a file that cannot be read through its index.
    ///
    /// The source facade recovers from these by switching to the streaming path.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            SourceError::InvalidMagic { .. }
                | SourceError::InvalidIndex { .. }
                | SourceError::MalformedRecord { .. }
                | SourceError::OutOfBounds { .. }
        )
    }

    /// Whether this error is a caller bug rather than a data problem.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            SourceError::NotInitialized { .. } | SourceError::AlreadyInitialized
        )
    }

    /// Get structured fields for logging.
    pub fn log_fields(&self) -> Vec<(&'static str, String)> {
        match self {
            SourceError::AccessDenied { path } | SourceError::NotFound { path } => {
                vec![("path", path.clone())]
            }
            SourceError::Unreachable { url, reason } => {
                vec![("url", url.clone()), ("reason", reason.clone())]
            }
            SourceError::MissingLength { url } | SourceError::RangeNotSupported { url } => {
                vec![("url", url.clone())]
            }
            SourceError::Io { context, message } => {
                vec![("context", context.clone()), ("message", message.clone())]
            }
            SourceError::InvalidMagic { found } => vec![("found", found.clone())],
            SourceError::InvalidIndex { reason } => vec![("reason", reason.clone())],
            SourceError::MalformedRecord {
                record,
                offset,
                message,
            } => {
                let mut fields = vec![("record", record.clone())];
                if let Some(offset) = offset {
                    fields.push(("offset", offset.to_string()));
                }
                fields.push(("message", message.clone()));
                fields
            }
            SourceError::UnsupportedCompression { compression } => {
                vec![("compression", compression.clone())]
            }
            SourceError::Decompression {
                compression,
                message,
            } => vec![
                ("compression", compression.clone()),
                ("message", message.clone()),
            ],
            SourceError::CrcMismatch { expected, actual } => vec![
                ("expected", format!("{expected:#010x}")),
                ("actual", format!("{actual:#010x}")),
            ],
            SourceError::UnknownChannel { channel_id } => {
                vec![("channel_id", channel_id.to_string())]
            }
            SourceError::OutOfBounds {
                offset,
                length,
                size,
            } => vec![
                ("offset", offset.to_string()),
                ("length", length.to_string()),
                ("size", size.to_string()),
            ],
            SourceError::StreamConsumed | SourceError::AlreadyInitialized => Vec::new(),
            SourceError::NotInitialized { operation } => vec![("operation", operation.clone())],
            SourceError::InvalidConfig { message } => vec![("message", message.clone())],
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::AccessDenied { path } => {
                write!(f, "Access denied: cannot read '{path}'")
            }
            SourceError::NotFound { path } => write!(f, "File not found: '{path}'"),
            SourceError::Unreachable { url, reason } => {
                write!(f, "Remote source '{url}' is unreachable: {reason}")
            }
            SourceError::MissingLength { url } => {
                write!(f, "Remote source '{url}' is missing length (no Content-Length header)")
            }
            SourceError::RangeNotSupported { url } => {
                write!(f, "Remote source '{url}' does not support byte-range requests")
            }
            SourceError::Io { context, message } => write!(f, "I/O error in {context}: {message}"),
            SourceError::InvalidMagic { found } => {
                write!(f, "Invalid MCAP magic: found {found}")
            }
            SourceError::InvalidIndex { reason } => write!(f, "Invalid index: {reason}"),
            SourceError::MalformedRecord {
                record,
                offset: Some(offset),
                message,
            } => write!(f, "Malformed {record} record at offset {offset}: {message}"),
            SourceError::MalformedRecord {
                record,
                offset: None,
                message,
            } => write!(f, "Malformed {record} record: {message}"),
            SourceError::UnsupportedCompression { compression } => {
                write!(f, "Unsupported compression: '{compression}'")
            }
            SourceError::Decompression {
                compression,
                message,
            } => write!(f, "Failed to decompress '{compression}' chunk: {message}"),
            SourceError::CrcMismatch { expected, actual } => write!(
                f,
                "Chunk CRC mismatch: expected {expected:#010x}, computed {actual:#010x}"
            ),
            SourceError::UnknownChannel { channel_id } => {
                write!(f, "Message references unknown channel {channel_id}")
            }
            SourceError::OutOfBounds {
                offset,
                length,
                size,
            } => write!(
                f,
                "Read of {length} bytes at offset {offset} exceeds size {size}"
            ),
            SourceError::StreamConsumed => write!(f, "Stream has already been consumed"),
            SourceError::NotInitialized { operation } => {
                write!(f, "Invariant violation: {operation} called before initialize")
            }
            SourceError::AlreadyInitialized => {
                write!(f, "Invariant violation: initialize called more than once")
            }
            SourceError::InvalidConfig { message } => write!(f, "Invalid configuration: {message}"),
        }
    }
}

impl std::error::Error for SourceError {}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        SourceError::Io {
            context: "IO".to_string(),
            message: err.to_string(),
        }
    }
}

/// Result type for robosource operations.
pub type Result<T> = std::result::Result<T, SourceError>;
