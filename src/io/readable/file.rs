// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Local file readable backed by a memory map.

use std::fs::File;
use std::io;
use std::path::Path;

use super::{check_range, Readable};
use crate::core::{Result, SourceError};

/// A local file, memory-mapped for the lifetime of the readable.
///
/// Dropping the readable unmaps the file and closes the handle.
pub struct FileReadable {
    /// `None` for an empty file, which cannot be mapped on every platform
    mmap: Option<memmap2::Mmap>,
    path: String,
}

impl FileReadable {
    /// Open and map a file.
    ///
    /// Permission and missing-file failures are reported as
    /// [`SourceError::AccessDenied`] and [`SourceError::NotFound`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let file = File::open(path.as_ref()).map_err(|e| open_error(&path_str, e))?;
        Self::from_file(&file, path_str)
    }

    /// Map an already opened file.
    pub fn from_file(file: &File, path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let len = file
            .metadata()
            .map_err(|e| SourceError::io("FileReadable", format!("stat '{path}': {e}")))?
            .len();

        let mmap = if len == 0 {
            None
        } else {
            // SAFETY: the map is owned by this value and reads hand out copies.
            let mmap = unsafe { memmap2::Mmap::map(file) }
                .map_err(|e| SourceError::io("FileReadable", format!("mmap '{path}': {e}")))?;
            Some(mmap)
        };

        Ok(Self { mmap, path })
    }

    /// Path the readable was opened from.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn data(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }
}

impl Readable for FileReadable {
    fn size(&self) -> Result<u64> {
        Ok(self.data().len() as u64)
    }

    fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let data = self.data();
        check_range(offset, length, data.len() as u64)?;
        let start = offset as usize;
        Ok(data[start..start + length as usize].to_vec())
    }
}

impl std::fmt::Debug for FileReadable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileReadable")
            .field("path", &self.path)
            .field("size", &self.data().len())
            .finish()
    }
}

/// Classify a failure to open or read a local file.
pub(crate) fn open_error(path: &str, err: io::Error) -> SourceError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => SourceError::AccessDenied {
            path: path.to_string(),
        },
        io::ErrorKind::NotFound => SourceError::NotFound {
            path: path.to_string(),
        },
        _ => SourceError::io("open", format!("'{path}': {err}")),
    }
}
