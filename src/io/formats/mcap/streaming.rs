// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Streaming MCAP reader.
//!
//! Consumes a forward-only byte stream in a single pass, with no reliance
//! on the summary section. Schema and channel records are merged as they
//! arrive, chunks are decompressed inline, and messages are yielded in
//! stream order.
//!
//! The stream may end without a footer (a file still being written); a
//! clean end of stream on a record boundary finishes the pass. A stream that
//! ends inside a record, or any malformed record, ends the pass with an
//! error after every message before it has been yielded.

use std::collections::{HashMap, VecDeque};
use std::io::{self, BufReader, Read};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::{Result, SourceConfig, SourceError};
use crate::io::decompress::DecompressHandlers;
use crate::io::metadata::{resolve_event, AccessPath, Channel, Initialization, MessageEvent, Schema};
use crate::io::traits::{BackfillArgs, MessageIterator, MessageIteratorArgs, MessageSource};

use super::chunk::decompress_chunk;
use super::constants::{
    opcode_name, MCAP_MAGIC, OPCODE_LEN_SIZE, OP_CHANNEL, OP_CHUNK, OP_DATA_END, OP_FOOTER,
    OP_HEADER, OP_MESSAGE, OP_SCHEMA,
};
use super::records::{
    parse_channel, parse_chunk, parse_header, parse_message, parse_schema, peek_message_time,
    RecordIter,
};

type BoxedStream = Box<dyn Read + Send>;

/// How far a streaming pass has read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamProgress {
    /// Bytes consumed from the stream so far
    pub bytes_read: u64,
    /// Size declared when the stream was opened
    pub total_size: u64,
}

impl StreamProgress {
    /// Fraction consumed, in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.total_size == 0 {
            return 1.0;
        }
        (self.bytes_read as f64 / self.total_size as f64).min(1.0)
    }
}

/// One record read off the stream.
#[derive(Debug)]
struct OwnedRecord {
    opcode: u8,
    offset: u64,
    content: Vec<u8>,
}

/// Reads whole records from a forward-only stream.
struct RecordReader {
    inner: BoxedStream,
    position: u64,
    max_record_size: u64,
}

impl RecordReader {
    fn new(inner: BoxedStream, max_record_size: u64) -> Self {
        Self {
            inner,
            position: 0,
            max_record_size,
        }
    }

    /// Read the leading magic and header record.
    fn read_preamble(&mut self) -> Result<()> {
        let mut magic = [0u8; MCAP_MAGIC.len()];
        self.inner
            .read_exact(&mut magic)
            .map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => SourceError::invalid_magic(&[]),
                _ => SourceError::io("StreamingMcapReader", e.to_string()),
            })?;
        if magic != MCAP_MAGIC {
            return Err(SourceError::invalid_magic(&magic));
        }
        self.position = MCAP_MAGIC.len() as u64;

        let header = self.next_record()?.ok_or_else(|| {
            SourceError::malformed("Header", Some(self.position), "stream ended before header")
        })?;
        if header.opcode != OP_HEADER {
            return Err(SourceError::malformed(
                "Header",
                Some(header.offset),
                format!("first record has opcode {:#04x}", header.opcode),
            ));
        }
        let (profile, library) =
            parse_header(&header.content).map_err(|e| e.at_offset(header.offset))?;
        debug!(
            context = "StreamingMcapReader",
            profile = %profile,
            library = %library,
            "Read header"
        );
        Ok(())
    }

    /// Next record, or `None` at a clean end of stream.
    fn next_record(&mut self) -> Result<Option<OwnedRecord>> {
        let offset = self.position;

        let mut opcode = [0u8; 1];
        loop {
            match self.inner.read(&mut opcode) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(SourceError::io("StreamingMcapReader", e.to_string())),
            }
        }
        let opcode = opcode[0];
        let record = opcode_name(opcode);

        let mut len_bytes = [0u8; 8];
        self.inner
            .read_exact(&mut len_bytes)
            .map_err(|e| truncated(e, record, offset, "stream ended inside record length"))?;
        let len = u64::from_le_bytes(len_bytes);
        if len > self.max_record_size {
            return Err(SourceError::malformed(
                record,
                Some(offset),
                format!("declares {len} bytes, limit is {}", self.max_record_size),
            ));
        }

        let mut content = Vec::with_capacity(len.min(1 << 20) as usize);
        (&mut self.inner)
            .take(len)
            .read_to_end(&mut content)
            .map_err(|e| truncated(e, record, offset, "read failed"))?;
        if (content.len() as u64) < len {
            return Err(SourceError::malformed(
                record,
                Some(offset),
                format!("stream ended after {} of {len} content bytes", content.len()),
            ));
        }

        self.position = offset + OPCODE_LEN_SIZE as u64 + len;
        Ok(Some(OwnedRecord {
            opcode,
            offset,
            content,
        }))
    }
}

fn truncated(err: io::Error, record: &str, offset: u64, what: &str) -> SourceError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        SourceError::malformed(record, Some(offset), what)
    } else {
        SourceError::io("StreamingMcapReader", err.to_string())
    }
}

/// Metadata and backfill buffer shared between the reader and its iterator.
#[derive(Debug, Default)]
struct PassState {
    channels: HashMap<u16, Channel>,
    schemas: HashMap<u16, Schema>,
    /// Last buffered message per topic in the current pass
    latest: HashMap<String, MessageEvent>,
    bytes_read: u64,
}

impl PassState {
    fn merge_schema(&mut self, content: &[u8], offset: u64) -> Result<()> {
        if let Some(schema) = parse_schema(content).map_err(|e| e.at_offset(offset))? {
            self.schemas.entry(schema.id).or_insert(schema);
        }
        Ok(())
    }

    fn merge_channel(&mut self, content: &[u8], offset: u64) -> Result<()> {
        let channel = parse_channel(content).map_err(|e| e.at_offset(offset))?;
        self.channels.entry(channel.id).or_insert(channel);
        Ok(())
    }
}

fn lock(state: &Mutex<PassState>) -> MutexGuard<'_, PassState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// MCAP reader over a forward-only stream.
pub struct StreamingMcapReader {
    records: Option<RecordReader>,
    /// Whether `records` is already past the magic and header
    preamble_read: bool,
    /// First record after the preamble, read during initialization
    pending: Option<OwnedRecord>,
    /// Malformed record hit during initialization
    pending_error: Option<SourceError>,
    total_size: u64,
    handlers: Arc<DecompressHandlers>,
    validate_crcs: bool,
    max_record_size: u64,
    stream_buffer_size: usize,
    state: Arc<Mutex<PassState>>,
    initialized: bool,
}

impl StreamingMcapReader {
    /// Create a reader over `stream`, which declares `total_size` bytes.
    ///
    /// The size is only used for progress reporting.
    pub fn new<S>(
        stream: S,
        total_size: u64,
        mut handlers: DecompressHandlers,
        config: &SourceConfig,
    ) -> Self
    where
        S: Read + Send + 'static,
    {
        handlers.set_limit(handlers.limit().min(config.max_record_size));
        let buffered: BoxedStream =
            Box::new(BufReader::with_capacity(config.stream_buffer_size, stream));
        Self {
            records: Some(RecordReader::new(buffered, config.max_record_size)),
            preamble_read: false,
            pending: None,
            pending_error: None,
            total_size,
            handlers: Arc::new(handlers),
            validate_crcs: config.validate_crcs,
            max_record_size: config.max_record_size,
            stream_buffer_size: config.stream_buffer_size,
            state: Arc::new(Mutex::new(PassState::default())),
            initialized: false,
        }
    }

    /// Replace a consumed stream with a fresh one positioned at byte 0.
    ///
    /// Metadata discovered so far is kept; the next iterator starts a new pass.
    pub fn reset_stream<S>(&mut self, stream: S, total_size: u64)
    where
        S: Read + Send + 'static,
    {
        let buffered: BoxedStream =
            Box::new(BufReader::with_capacity(self.stream_buffer_size, stream));
        self.records = Some(RecordReader::new(buffered, self.max_record_size));
        self.preamble_read = false;
        self.pending = None;
        self.pending_error = None;
        self.total_size = total_size;
        lock(&self.state).bytes_read = 0;
    }

    /// Whether the stream has been handed to an iterator.
    pub fn is_consumed(&self) -> bool {
        self.records.is_none()
    }

    /// Progress of the current pass.
    pub fn progress(&self) -> StreamProgress {
        StreamProgress {
            bytes_read: lock(&self.state).bytes_read,
            total_size: self.total_size,
        }
    }

    /// Channels discovered so far, including those found while iterating.
    pub fn channels(&self) -> HashMap<u16, Channel> {
        lock(&self.state).channels.clone()
    }

    /// Schemas discovered so far.
    pub fn schemas(&self) -> HashMap<u16, Schema> {
        lock(&self.state).schemas.clone()
    }

    /// Pick up schemas and channels from a chunk without yielding its messages.
    fn harvest_chunk(&self, content: &[u8], offset: u64) -> Result<u64> {
        let chunk = parse_chunk(content).map_err(|e| e.at_offset(offset))?;
        let records = decompress_chunk(&chunk, &self.handlers, self.validate_crcs)?;
        let mut state = lock(&self.state);
        for record in RecordIter::new(&records) {
            let record = record.map_err(|e| e.at_offset(offset))?;
            match record.opcode {
                OP_SCHEMA => state.merge_schema(record.content, offset)?,
                OP_CHANNEL => state.merge_channel(record.content, offset)?,
                _ => {}
            }
        }
        Ok(chunk.message_start_time)
    }
}

impl MessageSource for StreamingMcapReader {
    fn initialize(&mut self) -> Result<Initialization> {
        if self.initialized {
            return Err(SourceError::AlreadyInitialized);
        }
        let records = self.records.as_mut().ok_or(SourceError::StreamConsumed)?;
        records.read_preamble()?;
        self.preamble_read = true;

        // A bad record here is reported by the iterator, after any messages.
        let mut start_time = None;
        loop {
            let record = match records.next_record() {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) => {
                    self.pending_error = Some(e);
                    break;
                }
            };
            let merged = match record.opcode {
                OP_SCHEMA => lock(&self.state).merge_schema(&record.content, record.offset),
                OP_CHANNEL => lock(&self.state).merge_channel(&record.content, record.offset),
                OP_MESSAGE => {
                    start_time = peek_message_time(&record.content)
                        .ok()
                        .map(|(_, log_time)| log_time);
                    self.pending = Some(record);
                    break;
                }
                OP_CHUNK | OP_DATA_END | OP_FOOTER => {
                    self.pending = Some(record);
                    break;
                }
                _ => Ok(()),
            };
            if let Err(e) = merged {
                self.pending_error = Some(e);
                break;
            }
        }
        let position = records.position;

        if let Some(record) = self.pending.as_ref().filter(|r| r.opcode == OP_CHUNK) {
            match self.harvest_chunk(&record.content, record.offset) {
                Ok(chunk_start) => start_time = Some(chunk_start),
                // The iterator reports the failure when it reaches this chunk.
                Err(e) => debug!(
                    context = "StreamingMcapReader",
                    error = %e,
                    "Could not read metadata from first chunk"
                ),
            }
        }

        let state = {
            let mut state = lock(&self.state);
            state.bytes_read = position;
            Initialization {
                channels: state.channels.clone(),
                schemas: state.schemas.clone(),
                start_time,
                end_time: None,
                message_count: 0,
                access: AccessPath::Streaming,
                problems: Vec::new(),
            }
        };

        info!(
            context = "StreamingMcapReader",
            channels = state.channels.len(),
            schemas = state.schemas.len(),
            bytes_read = position,
            total_size = self.total_size,
            "Initialized streaming reader"
        );
        self.initialized = true;
        Ok(state)
    }

    fn message_iterator(&mut self, args: MessageIteratorArgs) -> Result<MessageIterator> {
        if !self.initialized {
            return Err(SourceError::not_initialized("message_iterator"));
        }
        let mut records = self.records.take().ok_or(SourceError::StreamConsumed)?;
        if !self.preamble_read {
            records.read_preamble()?;
        }

        {
            let mut state = lock(&self.state);
            state.latest.clear();
            state.bytes_read = records.position;
        }

        Ok(Box::new(StreamingMessageIter {
            records,
            pending: self.pending.take(),
            queue: VecDeque::new(),
            deferred: self.pending_error.take(),
            state: Arc::clone(&self.state),
            handlers: Arc::clone(&self.handlers),
            validate_crcs: self.validate_crcs,
            args,
            done: false,
        }))
    }

    fn get_backfill_messages(&mut self, args: BackfillArgs) -> Result<Vec<MessageEvent>> {
        if !self.initialized {
            return Err(SourceError::not_initialized("get_backfill_messages"));
        }
        let state = lock(&self.state);
        let mut topics: Vec<&String> = args.topics.iter().collect();
        topics.sort();
        Ok(topics
            .into_iter()
            .filter_map(|topic| state.latest.get(topic))
            .filter(|event| event.log_time <= args.time)
            .cloned()
            .collect())
    }
}

/// One forward pass over the stream.
struct StreamingMessageIter {
    records: RecordReader,
    pending: Option<OwnedRecord>,
    /// Messages decoded but not yet yielded
    queue: VecDeque<MessageEvent>,
    /// Error to report once `queue` drains
    deferred: Option<SourceError>,
    state: Arc<Mutex<PassState>>,
    handlers: Arc<DecompressHandlers>,
    validate_crcs: bool,
    args: MessageIteratorArgs,
    done: bool,
}

impl StreamingMessageIter {
    /// Process one top-level record. Returns `false` at the end of the data section.
    fn handle_record(&mut self, record: OwnedRecord) -> Result<bool> {
        match record.opcode {
            OP_CHUNK => {
                let chunk = parse_chunk(&record.content).map_err(|e| e.at_offset(record.offset))?;
                let records = decompress_chunk(&chunk, &self.handlers, self.validate_crcs)?;
                for inner in RecordIter::new(&records) {
                    let inner = inner.map_err(|e| e.at_offset(record.offset))?;
                    self.apply(inner.opcode, inner.content, record.offset)?;
                }
                Ok(true)
            }
            OP_DATA_END | OP_FOOTER => Ok(false),
            opcode => {
                self.apply(opcode, &record.content, record.offset)?;
                Ok(true)
            }
        }
    }

    /// Apply a schema, channel or message record; other records are ignored.
    fn apply(&mut self, opcode: u8, content: &[u8], offset: u64) -> Result<()> {
        let mut state = lock(&self.state);
        match opcode {
            OP_SCHEMA => state.merge_schema(content, offset),
            OP_CHANNEL => state.merge_channel(content, offset),
            OP_MESSAGE => {
                let message = parse_message(content).map_err(|e| e.at_offset(offset))?;
                let channel = state.channels.get(&message.channel_id).ok_or(
                    SourceError::UnknownChannel {
                        channel_id: message.channel_id,
                    },
                )?;
                let event = resolve_event(channel, &state.schemas, message);

                let wanted =
                    self.args.contains_time(event.log_time) && self.args.wants_topic(&event.topic);
                if wanted {
                    state.latest.insert(event.topic.clone(), event.clone());
                    self.queue.push_back(event);
                } else if event.log_time <= self.args.end_or_max() {
                    state.latest.insert(event.topic.clone(), event);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl Iterator for StreamingMessageIter {
    type Item = Result<MessageEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Some(Ok(event));
            }
            if let Some(err) = self.deferred.take() {
                self.done = true;
                return Some(Err(err));
            }
            if self.done {
                return None;
            }

            let record = match self.pending.take() {
                Some(record) => record,
                None => match self.records.next_record() {
                    Ok(Some(record)) => record,
                    Ok(None) => {
                        debug!(
                            context = "StreamingMcapReader",
                            bytes_read = self.records.position,
                            "Stream ended without a data end record"
                        );
                        self.done = true;
                        continue;
                    }
                    Err(e) => {
                        warn!(
                            context = "StreamingMcapReader",
                            error = %e,
                            "Truncating playback at malformed record"
                        );
                        self.deferred = Some(e);
                        continue;
                    }
                },
            };
            lock(&self.state).bytes_read = self.records.position;

            match self.handle_record(record) {
                Ok(true) => {}
                Ok(false) => self.done = true,
                Err(e) => {
                    warn!(
                        context = "StreamingMcapReader",
                        error = %e,
                        "Truncating playback at malformed record"
                    );
                    self.deferred = Some(e);
                }
            }
        }
    }
}
