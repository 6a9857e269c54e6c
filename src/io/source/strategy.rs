// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Access strategy selection.
//!
//! - **Auto**: try the index, fall back to streaming when it is missing or
//!   unusable
//! - **Indexed**: require the index; structural problems are errors
//! - **Streaming**: skip the index and read the file front to back

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::SourceError;

/// How a source chooses between the indexed and streaming readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessStrategy {
    /// Indexed when possible, streaming otherwise
    #[default]
    Auto,
    /// Indexed only
    Indexed,
    /// Streaming only
    Streaming,
}

impl AccessStrategy {
    /// Whether the index should be probed at all.
    pub fn tries_index(&self) -> bool {
        !matches!(self, AccessStrategy::Streaming)
    }

    /// Whether an unusable index may fall back to streaming.
    pub fn allows_fallback(&self) -> bool {
        !matches!(self, AccessStrategy::Indexed)
    }
}

impl fmt::Display for AccessStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessStrategy::Auto => write!(f, "auto"),
            AccessStrategy::Indexed => write!(f, "indexed"),
            AccessStrategy::Streaming => write!(f, "streaming"),
        }
    }
}

impl FromStr for AccessStrategy {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(AccessStrategy::Auto),
            "indexed" => Ok(AccessStrategy::Indexed),
            "streaming" => Ok(AccessStrategy::Streaming),
            other => Err(SourceError::invalid_config(format!(
                "unknown access strategy '{other}' (expected auto, indexed or streaming)"
            ))),
        }
    }
}
