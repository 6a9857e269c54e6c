// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Source facade with automatic reader selection.
//!
//! A [`McapSource`] takes a [`DataSource`] (local file or URL), probes
//! whether the bytes can be read through their index, and delegates to the
//! indexed or streaming reader. The choice is made once, during
//! `initialize`, and never revisited.
//!
//! # Selection
//!
//! ```text
//! Uninitialized -> Probing -> Ready(Indexed | Streaming)
//!                     |
//!                     +-> Uninitialized (on error, no partial state)
//! ```
//!
//! Structural problems with the index (bad magic, inconsistent offsets,
//! malformed summary records) and usable-but-empty indexes fall back to
//! streaming. Everything else, such as a missing file or an unreachable
//! URL, is returned to the caller.

pub mod builder;
pub mod strategy;

pub use builder::SourceBuilder;
pub use strategy::AccessStrategy;

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::core::{Result, SourceConfig, SourceError};
use crate::io::decompress::DecompressHandlers;
use crate::io::formats::mcap::{IndexedMcapReader, StreamProgress, StreamingMcapReader};
use crate::io::metadata::{AccessPath, Channel, Initialization, MessageEvent};
use crate::io::readable::file::open_error;
use crate::io::readable::remote::{open_stream, RemoteStream};
use crate::io::readable::{FileReadable, Readable, RemoteReadable};
use crate::io::traits::{BackfillArgs, MessageIterator, MessageIteratorArgs, MessageSource};

/// Where a source's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// A local file
    File {
        /// Path to the file
        path: PathBuf,
    },
    /// A remote object reachable over HTTP(S)
    Url {
        /// Location of the object
        url: String,
    },
}

impl DataSource {
    /// Describe a local file.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        DataSource::File { path: path.into() }
    }

    /// Describe a remote object.
    pub fn url(url: impl Into<String>) -> Self {
        DataSource::Url { url: url.into() }
    }

    /// Interpret a command-line argument: `http://` and `https://` are URLs,
    /// anything else is a path.
    pub fn parse(s: &str) -> Self {
        let lower = s.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::url(s)
        } else {
            Self::file(s)
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::File { path } => write!(f, "{}", path.display()),
            DataSource::Url { url } => write!(f, "{url}"),
        }
    }
}

/// Reopens the underlying bytes as a fresh stream.
type StreamOpener = Box<dyn Fn() -> Result<RemoteStream> + Send>;

/// The reader chosen during initialization.
enum Delegate {
    Indexed(IndexedMcapReader<Box<dyn Readable>>),
    Streaming {
        reader: StreamingMcapReader,
        reopen: StreamOpener,
    },
}

enum SourceState {
    Uninitialized,
    Probing,
    Ready(Box<Delegate>),
}

/// Outcome of trying the index.
enum Probe {
    Indexed(Box<IndexedMcapReader<Box<dyn Readable>>>, Initialization),
    Fallback(String),
}

/// An MCAP playback source over a local file or URL.
pub struct McapSource {
    source: DataSource,
    config: SourceConfig,
    handlers: DecompressHandlers,
    strategy: AccessStrategy,
    state: SourceState,
    initialization: Option<Initialization>,
}

impl McapSource {
    /// Create an uninitialized source with default settings.
    pub fn new(source: DataSource) -> Self {
        Self::with_parts(
            source,
            SourceConfig::default(),
            DecompressHandlers::default(),
            AccessStrategy::default(),
        )
    }

    /// Create an uninitialized source for a local file.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(DataSource::file(path))
    }

    /// Create an uninitialized source for a URL.
    pub fn url(url: impl Into<String>) -> Self {
        Self::new(DataSource::url(url))
    }

    pub(crate) fn with_parts(
        source: DataSource,
        config: SourceConfig,
        handlers: DecompressHandlers,
        strategy: AccessStrategy,
    ) -> Self {
        Self {
            source,
            config,
            handlers,
            strategy,
            state: SourceState::Uninitialized,
            initialization: None,
        }
    }

    /// The source descriptor.
    pub fn source(&self) -> &DataSource {
        &self.source
    }

    /// The configuration.
    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// The decompression handlers passed to the readers.
    pub fn handlers(&self) -> &DecompressHandlers {
        &self.handlers
    }

    /// The access strategy.
    pub fn strategy(&self) -> AccessStrategy {
        self.strategy
    }

    /// Whether `initialize` has succeeded.
    pub fn is_initialized(&self) -> bool {
        matches!(self.state, SourceState::Ready(_))
    }

    /// The result of `initialize`, once it has succeeded.
    pub fn initialization(&self) -> Option<&Initialization> {
        self.initialization.as_ref()
    }

    /// Reader serving this source, once chosen.
    pub fn access(&self) -> Option<AccessPath> {
        match &self.state {
            SourceState::Ready(delegate) => Some(match delegate.as_ref() {
                Delegate::Indexed(_) => AccessPath::Indexed,
                Delegate::Streaming { .. } => AccessPath::Streaming,
            }),
            _ => None,
        }
    }

    /// Channels known so far.
    ///
    /// On the streaming path this grows as iteration discovers channels.
    pub fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = match &self.state {
            SourceState::Ready(delegate) => match delegate.as_ref() {
                Delegate::Streaming { reader, .. } => reader.channels().into_values().collect(),
                Delegate::Indexed(_) => self
                    .initialization
                    .as_ref()
                    .map(|init| init.channels.values().cloned().collect())
                    .unwrap_or_default(),
            },
            _ => Vec::new(),
        };
        channels.sort_by_key(|c| c.id);
        channels
    }

    /// Progress of the current streaming pass; `None` on the indexed path.
    pub fn progress(&self) -> Option<StreamProgress> {
        match &self.state {
            SourceState::Ready(delegate) => match delegate.as_ref() {
                Delegate::Streaming { reader, .. } => Some(reader.progress()),
                Delegate::Indexed(_) => None,
            },
            _ => None,
        }
    }

    fn open_file(&self, path: &Path) -> Result<(Delegate, Initialization)> {
        let display = path.display().to_string();
        let file = File::open(path).map_err(|e| open_error(&display, e))?;

        // A small read surfaces permission problems before the index is tried.
        let mut probe = Vec::with_capacity(8);
        (&file)
            .take(8)
            .read_to_end(&mut probe)
            .map_err(|e| open_error(&display, e))?;
        debug!(
            context = "McapSource",
            path = %path.display(),
            probed = probe.len(),
            "Opened local file"
        );

        let reason = if self.strategy.tries_index() {
            let readable = FileReadable::from_file(&file, display.clone())?;
            match self.probe_indexed(Box::new(readable))? {
                Probe::Indexed(reader, init) => return Ok((Delegate::Indexed(*reader), init)),
                Probe::Fallback(reason) => reason,
            }
        } else {
            "streaming access requested".to_string()
        };

        let path = path.to_path_buf();
        self.open_streaming(Box::new(move || open_file_stream(&path)), reason)
    }

    fn open_url(&self, url: &str) -> Result<(Delegate, Initialization)> {
        let mut remote = RemoteReadable::new(url, &self.config.http)?;
        remote.open()?;

        let reason = if self.strategy.tries_index() {
            match self.probe_indexed(Box::new(remote))? {
                Probe::Indexed(reader, init) => return Ok((Delegate::Indexed(*reader), init)),
                Probe::Fallback(reason) => reason,
            }
        } else {
            "streaming access requested".to_string()
        };

        let url = url.to_string();
        let http = self.config.http.clone();
        self.open_streaming(Box::new(move || open_stream(&url, &http)), reason)
    }

    fn probe_indexed(&self, readable: Box<dyn Readable>) -> Result<Probe> {
        let mut reader = IndexedMcapReader::new(readable, self.handlers.clone(), &self.config);
        match reader.initialize() {
            Ok(init) if reader.is_usable() => Ok(Probe::Indexed(Box::new(reader), init)),
            Ok(init) => {
                let reason = format!(
                    "index lists {} chunks and {} channels",
                    reader.chunk_indexes().len(),
                    init.channels.len()
                );
                if !self.strategy.allows_fallback() {
                    return Err(SourceError::invalid_index(reason));
                }
                info!(
                    context = "McapSource",
                    source = %self.source,
                    reason = %reason,
                    "Index is unusable, falling back to streaming"
                );
                Ok(Probe::Fallback(reason))
            }
            Err(e) if e.is_structural() && self.strategy.allows_fallback() => {
                warn!(
                    context = "McapSource",
                    source = %self.source,
                    error = %e,
                    "Indexed access failed, falling back to streaming"
                );
                Ok(Probe::Fallback(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    fn open_streaming(
        &self,
        reopen: StreamOpener,
        reason: String,
    ) -> Result<(Delegate, Initialization)> {
        let (stream, size) = reopen()?;
        let mut reader = StreamingMcapReader::new(stream, size, self.handlers.clone(), &self.config);
        let mut init = reader.initialize()?;
        init.problems.push(reason);
        Ok((Delegate::Streaming { reader, reopen }, init))
    }

    fn delegate(&mut self, operation: &str) -> Result<&mut Delegate> {
        match &mut self.state {
            SourceState::Ready(delegate) => Ok(delegate.as_mut()),
            _ => Err(SourceError::not_initialized(operation)),
        }
    }
}

fn open_file_stream(path: &Path) -> Result<RemoteStream> {
    let display = path.display().to_string();
    let file = File::open(path).map_err(|e| open_error(&display, e))?;
    let size = file
        .metadata()
        .map_err(|e| SourceError::io("McapSource", format!("stat '{display}': {e}")))?
        .len();
    Ok((Box::new(file), size))
}

impl MessageSource for McapSource {
    fn initialize(&mut self) -> Result<Initialization> {
        if !matches!(self.state, SourceState::Uninitialized) {
            return Err(SourceError::AlreadyInitialized);
        }
        self.state = SourceState::Probing;

        let opened = match &self.source {
            DataSource::File { path } => self.open_file(path),
            DataSource::Url { url } => self.open_url(url),
        };

        match opened {
            Ok((delegate, init)) => {
                info!(
                    context = "McapSource",
                    source = %self.source,
                    access = %init.access,
                    channels = init.channels.len(),
                    start_time = ?init.start_time,
                    end_time = ?init.end_time,
                    "Initialized source"
                );
                self.state = SourceState::Ready(Box::new(delegate));
                self.initialization = Some(init.clone());
                Ok(init)
            }
            Err(e) => {
                self.state = SourceState::Uninitialized;
                Err(e)
            }
        }
    }

    fn message_iterator(&mut self, args: MessageIteratorArgs) -> Result<MessageIterator> {
        match self.delegate("message_iterator")? {
            Delegate::Indexed(reader) => reader.message_iterator(args),
            Delegate::Streaming { reader, reopen } => {
                if reader.is_consumed() {
                    let (stream, size) = (*reopen)()?;
                    debug!(context = "McapSource", size, "Reopened stream for a new pass");
                    reader.reset_stream(stream, size);
                }
                reader.message_iterator(args)
            }
        }
    }

    fn get_backfill_messages(&mut self, args: BackfillArgs) -> Result<Vec<MessageEvent>> {
        match self.delegate("get_backfill_messages")? {
            Delegate::Indexed(reader) => reader.get_backfill_messages(args),
            Delegate::Streaming { reader, .. } => reader.get_backfill_messages(args),
        }
    }
}

impl fmt::Debug for McapSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            SourceState::Uninitialized => "uninitialized",
            SourceState::Probing => "probing",
            SourceState::Ready(_) => "ready",
        };
        f.debug_struct("McapSource")
            .field("source", &self.source)
            .field("strategy", &self.strategy)
            .field("state", &state)
            .field("access", &self.access())
            .finish()
    }
}
