// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Source configuration.
//!
//! Every field has a default, so a config file only needs the keys it
//! changes:
//!
//! ```toml
//! validate_crcs = false
//!
//! [http]
//! timeout_secs = 30
//! headers = { Authorization = "Bearer abc" }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{Result, SourceError};

/// Default upper bound on a single record's declared length and on a
/// chunk's declared uncompressed size (4 GiB).
pub const DEFAULT_MAX_RECORD_SIZE: u64 = 4 * 1024 * 1024 * 1024;

/// Default buffer size for the streaming path.
pub const DEFAULT_STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// Configuration shared by the readers and the source facade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    /// Verify chunk CRCs when the file records one
    pub validate_crcs: bool,
    /// Records declaring a larger length are treated as malformed, and
    /// chunks declaring a larger uncompressed size fail to decompress
    pub max_record_size: u64,
    /// Buffer size used when reading a forward-only stream
    pub stream_buffer_size: usize,
    /// Remote access settings
    pub http: HttpConfig,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            validate_crcs: true,
            max_record_size: DEFAULT_MAX_RECORD_SIZE,
            stream_buffer_size: DEFAULT_STREAM_BUFFER_SIZE,
            http: HttpConfig::default(),
        }
    }
}

impl SourceConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SourceConfig =
            toml::from_str(text).map_err(|e| SourceError::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SourceError::invalid_config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.max_record_size == 0 {
            return Err(SourceError::invalid_config("max_record_size must be > 0"));
        }
        if self.stream_buffer_size == 0 {
            return Err(SourceError::invalid_config("stream_buffer_size must be > 0"));
        }
        if self.http.timeout_secs == Some(0) {
            return Err(SourceError::invalid_config("http.timeout_secs must be > 0"));
        }
        Ok(())
    }

    /// Set CRC validation.
    pub fn with_validate_crcs(mut self, validate: bool) -> Self {
        self.validate_crcs = validate;
        self
    }

    /// Set the maximum record size.
    pub fn with_max_record_size(mut self, size: u64) -> Self {
        self.max_record_size = size;
        self
    }

    /// Set the remote access settings.
    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }
}

/// Settings for the HTTP-backed readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    /// Per-request timeout; `None` waits indefinitely
    pub timeout_secs: Option<u64>,
    /// User-Agent header sent with every request
    pub user_agent: String,
    /// Extra headers sent with every request
    pub headers: BTreeMap<String, String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Some(60),
            user_agent: format!("robosource/{}", env!("CARGO_PKG_VERSION")),
            headers: BTreeMap::new(),
        }
    }
}
