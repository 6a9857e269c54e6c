// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Decompression handlers for chunk payloads.
//!
//! A [`DecompressHandlers`] value maps the compression identifier stored in
//! a chunk record to the function that restores its records. It is handed
//! to each reader at construction; there is no process-wide registry.
//!
//! # Example
//!
//! ```
//! use robosource::io::decompress::DecompressHandlers;
//!
//! let mut handlers = DecompressHandlers::default();
//! handlers.register("identity", |data: &[u8], _size: u64| Ok(data.to_vec()));
//! assert!(handlers.supports("zstd"));
//! assert!(handlers.supports("identity"));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

use crate::core::config::DEFAULT_MAX_RECORD_SIZE;
use crate::core::{Result, SourceError};

/// Decompress `data` into exactly `uncompressed_size` bytes.
pub type DecompressFn = Arc<dyn Fn(&[u8], u64) -> Result<Vec<u8>> + Send + Sync>;

/// Compression identifier for zstd chunks.
pub const COMPRESSION_ZSTD: &str = "zstd";
/// Compression identifier for LZ4 frame chunks.
pub const COMPRESSION_LZ4: &str = "lz4";

/// Output buffers start at most this many times the compressed size.
const PREALLOC_RATIO: u64 = 8;

/// Mapping from compression identifier to decompression function.
///
/// The empty identifier means "uncompressed" and never reaches a handler.
/// Chunks declaring more than [`limit`](Self::limit) uncompressed bytes are
/// rejected before any handler runs.
#[derive(Clone)]
pub struct DecompressHandlers {
    handlers: HashMap<String, DecompressFn>,
    limit: u64,
}

impl DecompressHandlers {
    /// Create a registry with no handlers; only uncompressed chunks can be read.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
            limit: DEFAULT_MAX_RECORD_SIZE,
        }
    }

    /// Largest uncompressed size a chunk may declare.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Set the largest uncompressed size a chunk may declare.
    pub fn set_limit(&mut self, limit: u64) {
        self.limit = limit;
    }

    /// Register (or replace) the handler for a compression identifier.
    pub fn register<F>(&mut self, compression: impl Into<String>, handler: F)
    where
        F: Fn(&[u8], u64) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.handlers.insert(compression.into(), Arc::new(handler));
    }

    /// Remove the handler for a compression identifier.
    ///
    /// Returns `true` if a handler was removed.
    pub fn unregister(&mut self, compression: &str) -> bool {
        self.handlers.remove(compression).is_some()
    }

    /// Check if chunks with this compression can be read.
    pub fn supports(&self, compression: &str) -> bool {
        compression.is_empty() || self.handlers.contains_key(compression)
    }

    /// Registered identifiers, sorted.
    pub fn compressions(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Merge another registry into this one; entries in `other` win.
    pub fn extend(&mut self, other: DecompressHandlers) {
        self.handlers.extend(other.handlers);
    }

    /// Restore a chunk's records.
    ///
    /// Fails with [`SourceError::UnsupportedCompression`] if no handler is
    /// registered, and with [`SourceError::Decompression`] if the declared
    /// size is over the limit or the handler fails or produces the wrong
    /// number of bytes.
    pub fn decompress(
        &self,
        compression: &str,
        data: &[u8],
        uncompressed_size: u64,
    ) -> Result<Vec<u8>> {
        if compression.is_empty() {
            if data.len() as u64 != uncompressed_size {
                return Err(SourceError::decompression(
                    "none",
                    format!(
                        "uncompressed chunk holds {} bytes, header declares {uncompressed_size}",
                        data.len()
                    ),
                ));
            }
            return Ok(data.to_vec());
        }

        let handler =
            self.handlers
                .get(compression)
                .ok_or_else(|| SourceError::UnsupportedCompression {
                    compression: compression.to_string(),
                })?;

        if uncompressed_size > self.limit {
            return Err(SourceError::decompression(
                compression,
                format!(
                    "header declares {uncompressed_size} bytes, limit is {}",
                    self.limit
                ),
            ));
        }

        let out = handler(data, uncompressed_size)?;
        if out.len() as u64 != uncompressed_size {
            return Err(SourceError::decompression(
                compression,
                format!(
                    "produced {} bytes, header declares {uncompressed_size}",
                    out.len()
                ),
            ));
        }
        Ok(out)
    }
}

impl Default for DecompressHandlers {
    /// Registry with the zstd and lz4 handlers.
    fn default() -> Self {
        let mut handlers = Self::empty();
        handlers.register(COMPRESSION_ZSTD, decompress_zstd);
        handlers.register(COMPRESSION_LZ4, decompress_lz4);
        handlers
    }
}

impl fmt::Debug for DecompressHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecompressHandlers")
            .field("compressions", &self.compressions())
            .field("limit", &self.limit)
            .finish()
    }
}

/// Read at most one byte past `uncompressed_size`, so an oversized stream
/// shows up as a length mismatch instead of growing without bound.
fn read_bounded<R: Read>(
    reader: R,
    compressed_len: usize,
    uncompressed_size: u64,
    compression: &str,
) -> Result<Vec<u8>> {
    let capacity = uncompressed_size.min((compressed_len as u64).saturating_mul(PREALLOC_RATIO));
    let mut out = Vec::with_capacity(capacity as usize);
    reader
        .take(uncompressed_size.saturating_add(1))
        .read_to_end(&mut out)
        .map_err(|e| SourceError::decompression(compression, e.to_string()))?;
    Ok(out)
}

fn decompress_zstd(data: &[u8], uncompressed_size: u64) -> Result<Vec<u8>> {
    let decoder = zstd::stream::read::Decoder::new(data)
        .map_err(|e| SourceError::decompression(COMPRESSION_ZSTD, e.to_string()))?;
    read_bounded(decoder, data.len(), uncompressed_size, COMPRESSION_ZSTD)
}

/// MCAP stores lz4 chunks in the LZ4 frame format.
fn decompress_lz4(data: &[u8], uncompressed_size: u64) -> Result<Vec<u8>> {
    let decoder = lz4_flex::frame::FrameDecoder::new(data);
    read_bounded(decoder, data.len(), uncompressed_size, COMPRESSION_LZ4)
}
