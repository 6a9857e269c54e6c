// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Random-access byte sources.
//!
//! A [`Readable`] answers two questions: how many bytes are there, and what
//! are the bytes in a given range. The indexed reader needs nothing else, so
//! the same reader serves local files and remote objects.

pub mod file;
pub mod remote;

pub use file::FileReadable;
pub use remote::RemoteReadable;

use crate::core::{Result, SourceError};

/// A sized, randomly addressable byte store.
///
/// Implementations must be shareable across threads; the indexed reader
/// hands a shared handle to every iterator it creates.
pub trait Readable: Send + Sync {
    /// Total size in bytes.
    fn size(&self) -> Result<u64>;

    /// Read exactly `length` bytes starting at `offset`.
    ///
    /// Fails with [`SourceError::OutOfBounds`] if the range extends past
    /// [`size`](Readable::size).
    fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>>;
}

impl<R: Readable + ?Sized> Readable for Box<R> {
    fn size(&self) -> Result<u64> {
        (**self).size()
    }

    fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        (**self).read(offset, length)
    }
}

/// Check that `[offset, offset + length)` fits in `size`.
pub(crate) fn check_range(offset: u64, length: u64, size: u64) -> Result<()> {
    match offset.checked_add(length) {
        Some(end) if end <= size => Ok(()),
        _ => Err(SourceError::OutOfBounds {
            offset,
            length,
            size,
        }),
    }
}

/// In-memory readable.
#[derive(Debug, Clone, Default)]
pub struct BytesReadable {
    data: Vec<u8>,
}

impl BytesReadable {
    /// Wrap a byte buffer.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    /// The wrapped bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl Readable for BytesReadable {
    fn size(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        check_range(offset, length, self.data.len() as u64)?;
        let start = offset as usize;
        Ok(self.data[start..start + length as usize].to_vec())
    }
}
