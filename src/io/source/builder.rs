// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Builder pattern for creating sources.
//!
//! The `SourceBuilder` provides a fluent API for configuring a
//! [`McapSource`] before it is initialized.

use std::path::Path;

use crate::core::{Result, SourceConfig, SourceError};
use crate::io::decompress::DecompressHandlers;

use super::strategy::AccessStrategy;
use super::{DataSource, McapSource};

/// Builder for [`McapSource`].
///
/// # Example
///
/// ```rust,no_run
/// use robosource::io::{AccessStrategy, MessageSource, SourceBuilder};
///
/// let mut source = SourceBuilder::new()
///     .url("https://example.com/recording.mcap")
///     .validate_crcs(false)
///     .strategy(AccessStrategy::Auto)
///     .build()?;
/// let init = source.initialize()?;
/// println!("served by the {} reader", init.access);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct SourceBuilder {
    source: Option<DataSource>,
    config: SourceConfig,
    handlers: DecompressHandlers,
    strategy: AccessStrategy,
}

impl SourceBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read from a local file.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.source = Some(DataSource::file(path.as_ref()));
        self
    }

    /// Read from a remote URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.source = Some(DataSource::url(url));
        self
    }

    /// Set the source descriptor.
    pub fn source(mut self, source: DataSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: SourceConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable or disable chunk CRC checks.
    pub fn validate_crcs(mut self, validate: bool) -> Self {
        self.config.validate_crcs = validate;
        self
    }

    /// Set the access strategy.
    pub fn strategy(mut self, strategy: AccessStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Replace the decompression handlers.
    pub fn handlers(mut self, handlers: DecompressHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    /// Register an extra decompression handler.
    pub fn decompress_handler<F>(mut self, compression: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&[u8], u64) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.handlers.register(compression, handler);
        self
    }

    /// Build the source.
    ///
    /// # Errors
    ///
    /// Returns an error if no source is set or the configuration is invalid.
    pub fn build(self) -> Result<McapSource> {
        let source = self
            .source
            .ok_or_else(|| SourceError::invalid_config("SourceBuilder: source is not set"))?;
        self.config.validate()?;
        Ok(McapSource::with_parts(
            source,
            self.config,
            self.handlers,
            self.strategy,
        ))
    }
}
