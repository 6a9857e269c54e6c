// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Common utilities for integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tokio::sync::oneshot;

use robosource::{MessageEvent, MessageIterator, Result};

// ============================================================================
// MCAP Fixture Builder
// ============================================================================

const MAGIC: [u8; 8] = [0x89, b'M', b'C', b'A', b'P', b'0', b'\r', b'\n'];

const OP_HEADER: u8 = 0x01;
const OP_FOOTER: u8 = 0x02;
const OP_SCHEMA: u8 = 0x03;
const OP_CHANNEL: u8 = 0x04;
const OP_MESSAGE: u8 = 0x05;
const OP_CHUNK: u8 = 0x06;
const OP_MESSAGE_INDEX: u8 = 0x07;
const OP_CHUNK_INDEX: u8 = 0x08;
const OP_STATISTICS: u8 = 0x0B;
const OP_DATA_END: u8 = 0x0F;

/// A message to place in a fixture: `(channel_id, log_time, payload)`.
pub type Msg = (u16, u64, Vec<u8>);

/// Shorthand for a message whose payload names its topic index and time.
pub fn msg(channel_id: u16, log_time: u64) -> Msg {
    (
        channel_id,
        log_time,
        format!("{channel_id}@{log_time}").into_bytes(),
    )
}

/// Builds MCAP files byte by byte so tests control every structure.
#[derive(Debug, Clone)]
pub struct McapBuilder {
    schemas: Vec<(u16, String)>,
    channels: Vec<(u16, u16, String)>,
    chunks: Vec<(String, Vec<Msg>)>,
    loose: Vec<Msg>,
    late_channels: Vec<u16>,
    compression: String,
    summary: bool,
    summary_channels: bool,
    chunk_indexes: bool,
    statistics: bool,
    summary_crc: bool,
    chunk_crc: bool,
}

impl Default for McapBuilder {
    fn default() -> Self {
        Self {
            schemas: Vec::new(),
            channels: Vec::new(),
            chunks: Vec::new(),
            loose: Vec::new(),
            late_channels: Vec::new(),
            compression: String::new(),
            summary: true,
            summary_channels: true,
            chunk_indexes: true,
            statistics: true,
            summary_crc: true,
            chunk_crc: true,
        }
    }
}

impl McapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Two schemas and three channels: `/imu` (1), `/odom` (2), `/tf` (3).
    pub fn robot() -> Self {
        Self::new()
            .schema(1, "sensor_msgs/msg/Imu")
            .schema(2, "nav_msgs/msg/Odometry")
            .channel(1, 1, "/imu")
            .channel(2, 2, "/odom")
            .channel(3, 2, "/tf")
    }

    pub fn schema(mut self, id: u16, name: &str) -> Self {
        self.schemas.push((id, name.to_string()));
        self
    }

    pub fn channel(mut self, id: u16, schema_id: u16, topic: &str) -> Self {
        self.channels.push((id, schema_id, topic.to_string()));
        self
    }

    /// Compression used by chunks added after this call.
    pub fn compression(mut self, compression: &str) -> Self {
        self.compression = compression.to_string();
        self
    }

    /// Append a chunk holding `messages` in the given order.
    pub fn chunk(mut self, messages: Vec<Msg>) -> Self {
        self.chunks.push((self.compression.clone(), messages));
        self
    }

    /// Append messages written outside of any chunk.
    pub fn loose(mut self, messages: Vec<Msg>) -> Self {
        self.loose.extend(messages);
        self
    }

    /// Write this channel's record just before its first message instead
    /// of with the leading definitions. The summary still lists it.
    pub fn late_channel(mut self, id: u16) -> Self {
        self.late_channels.push(id);
        self
    }

    /// Point the footer at no summary section.
    pub fn without_summary(mut self) -> Self {
        self.summary = false;
        self
    }

    /// Leave channel and schema records out of the summary.
    pub fn without_summary_channels(mut self) -> Self {
        self.summary_channels = false;
        self
    }

    /// Leave chunk index records out of the summary.
    pub fn without_chunk_indexes(mut self) -> Self {
        self.chunk_indexes = false;
        self
    }

    pub fn without_statistics(mut self) -> Self {
        self.statistics = false;
        self
    }

    /// Record a summary CRC of 0.
    pub fn without_summary_crc(mut self) -> Self {
        self.summary_crc = false;
        self
    }

    /// Record chunk CRCs of 0.
    pub fn without_chunk_crc(mut self) -> Self {
        self.chunk_crc = false;
        self
    }

    /// Every message in the fixture, in file order.
    pub fn messages(&self) -> Vec<Msg> {
        let mut all = self.loose.clone();
        for (_, messages) in &self.chunks {
            all.extend(messages.iter().cloned());
        }
        all
    }

    pub fn topic(&self, channel_id: u16) -> String {
        self.channels
            .iter()
            .find(|(id, _, _)| *id == channel_id)
            .map(|(_, _, topic)| topic.clone())
            .unwrap_or_default()
    }

    fn schema_record(&self, id: u16, name: &str) -> Vec<u8> {
        let mut c = Vec::new();
        c.extend_from_slice(&id.to_le_bytes());
        put_string(&mut c, name);
        put_string(&mut c, "ros2msg");
        let data = format!("# {name}\nint32 value");
        c.extend_from_slice(&(data.len() as u32).to_le_bytes());
        c.extend_from_slice(data.as_bytes());
        record(OP_SCHEMA, &c)
    }

    fn channel_record(&self, id: u16, schema_id: u16, topic: &str) -> Vec<u8> {
        let mut c = Vec::new();
        c.extend_from_slice(&id.to_le_bytes());
        c.extend_from_slice(&schema_id.to_le_bytes());
        put_string(&mut c, topic);
        put_string(&mut c, "cdr");
        c.extend_from_slice(&0u32.to_le_bytes());
        record(OP_CHANNEL, &c)
    }

    fn definitions(&self, include_late: bool) -> Vec<u8> {
        let mut out = Vec::new();
        for (id, name) in &self.schemas {
            out.extend(self.schema_record(*id, name));
        }
        for (id, schema_id, topic) in &self.channels {
            if include_late || !self.late_channels.contains(id) {
                out.extend(self.channel_record(*id, *schema_id, topic));
            }
        }
        out
    }

    /// The channel record to emit before `m`, if `m` is the first message
    /// on a late channel.
    fn late_definition(&self, m: &Msg, written: &mut HashSet<u16>) -> Vec<u8> {
        if !self.late_channels.contains(&m.0) || !written.insert(m.0) {
            return Vec::new();
        }
        self.channels
            .iter()
            .find(|(id, _, _)| *id == m.0)
            .map(|(id, schema_id, topic)| self.channel_record(*id, *schema_id, topic))
            .unwrap_or_default()
    }

    /// Serialize the fixture.
    pub fn build(&self) -> Vec<u8> {
        let mut out = MAGIC.to_vec();

        let mut header = Vec::new();
        put_string(&mut header, "ros2");
        put_string(&mut header, "robosource-tests");
        out.extend(record(OP_HEADER, &header));

        let mut sequence = 0u32;
        let mut chunk_indexes = Vec::new();
        let mut channel_counts: BTreeMap<u16, u64> = BTreeMap::new();
        let mut late_written = HashSet::new();

        if self.chunks.is_empty() || !self.loose.is_empty() {
            out.extend(self.definitions(false));
        }
        for m in &self.loose {
            out.extend(self.late_definition(m, &mut late_written));
            out.extend(message_record(m, sequence));
            sequence += 1;
            *channel_counts.entry(m.0).or_default() += 1;
        }

        for (i, (compression, messages)) in self.chunks.iter().enumerate() {
            // Definitions travel in the first chunk.
            let mut records = if i == 0 {
                self.definitions(false)
            } else {
                Vec::new()
            };
            let mut index: BTreeMap<u16, Vec<(u64, u64)>> = BTreeMap::new();
            for m in messages {
                records.extend(self.late_definition(m, &mut late_written));
                index
                    .entry(m.0)
                    .or_default()
                    .push((m.1, records.len() as u64));
                records.extend(message_record(m, sequence));
                sequence += 1;
                *channel_counts.entry(m.0).or_default() += 1;
            }

            let start = messages.iter().map(|m| m.1).min().unwrap_or(0);
            let end = messages.iter().map(|m| m.1).max().unwrap_or(0);
            let crc = if self.chunk_crc {
                crc32fast::hash(&records)
            } else {
                0
            };
            let compressed = compress(compression, &records);

            let mut content = Vec::new();
            content.extend_from_slice(&start.to_le_bytes());
            content.extend_from_slice(&end.to_le_bytes());
            content.extend_from_slice(&(records.len() as u64).to_le_bytes());
            content.extend_from_slice(&crc.to_le_bytes());
            put_string(&mut content, compression);
            content.extend_from_slice(&(compressed.len() as u64).to_le_bytes());
            content.extend_from_slice(&compressed);

            let chunk_start = out.len() as u64;
            out.extend(record(OP_CHUNK, &content));
            let chunk_length = out.len() as u64 - chunk_start;

            let index_start = out.len() as u64;
            let mut index_offsets = Vec::new();
            for (channel_id, entries) in &index {
                index_offsets.push((*channel_id, out.len() as u64));
                let mut c = Vec::new();
                c.extend_from_slice(&channel_id.to_le_bytes());
                c.extend_from_slice(&((entries.len() * 16) as u32).to_le_bytes());
                for (t, off) in entries {
                    c.extend_from_slice(&t.to_le_bytes());
                    c.extend_from_slice(&off.to_le_bytes());
                }
                out.extend(record(OP_MESSAGE_INDEX, &c));
            }
            let index_length = out.len() as u64 - index_start;

            let mut ci = Vec::new();
            ci.extend_from_slice(&start.to_le_bytes());
            ci.extend_from_slice(&end.to_le_bytes());
            ci.extend_from_slice(&chunk_start.to_le_bytes());
            ci.extend_from_slice(&chunk_length.to_le_bytes());
            ci.extend_from_slice(&((index_offsets.len() * 10) as u32).to_le_bytes());
            for (channel_id, offset) in &index_offsets {
                ci.extend_from_slice(&channel_id.to_le_bytes());
                ci.extend_from_slice(&offset.to_le_bytes());
            }
            ci.extend_from_slice(&index_length.to_le_bytes());
            put_string(&mut ci, compression);
            ci.extend_from_slice(&(compressed.len() as u64).to_le_bytes());
            ci.extend_from_slice(&(records.len() as u64).to_le_bytes());
            chunk_indexes.push(record(OP_CHUNK_INDEX, &ci));
        }

        out.extend(record(OP_DATA_END, &0u32.to_le_bytes()));

        let summary_start = out.len() as u64;
        if self.summary {
            if self.summary_channels {
                out.extend(self.definitions(true));
            }
            if self.statistics {
                out.extend(self.statistics_record(&channel_counts));
            }
            if self.chunk_indexes {
                for ci in &chunk_indexes {
                    out.extend_from_slice(ci);
                }
            }
        }

        // Footer content is summary_start, summary_offset_start and a CRC
        // covering everything from the summary up to the CRC field.
        out.push(OP_FOOTER);
        out.extend_from_slice(&20u64.to_le_bytes());
        out.extend_from_slice(&(if self.summary { summary_start } else { 0 }).to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes());
        let crc = if self.summary && self.summary_crc {
            crc32fast::hash(&out[summary_start as usize..])
        } else {
            0
        };
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&MAGIC);
        out
    }

    fn statistics_record(&self, channel_counts: &BTreeMap<u16, u64>) -> Vec<u8> {
        let all = self.messages();
        let count = all.len() as u64;
        let start = all.iter().map(|m| m.1).min().unwrap_or(0);
        let end = all.iter().map(|m| m.1).max().unwrap_or(0);

        let mut c = Vec::new();
        c.extend_from_slice(&count.to_le_bytes());
        c.extend_from_slice(&(self.schemas.len() as u16).to_le_bytes());
        c.extend_from_slice(&(self.channels.len() as u32).to_le_bytes());
        c.extend_from_slice(&0u32.to_le_bytes());
        c.extend_from_slice(&0u32.to_le_bytes());
        c.extend_from_slice(&(self.chunks.len() as u32).to_le_bytes());
        c.extend_from_slice(&start.to_le_bytes());
        c.extend_from_slice(&end.to_le_bytes());
        c.extend_from_slice(&((channel_counts.len() * 10) as u32).to_le_bytes());
        for (id, n) in channel_counts {
            c.extend_from_slice(&id.to_le_bytes());
            c.extend_from_slice(&n.to_le_bytes());
        }
        record(OP_STATISTICS, &c)
    }
}

fn put_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn record(opcode: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![opcode];
    out.extend_from_slice(&(content.len() as u64).to_le_bytes());
    out.extend_from_slice(content);
    out
}

fn message_record(m: &Msg, sequence: u32) -> Vec<u8> {
    let mut c = Vec::new();
    c.extend_from_slice(&m.0.to_le_bytes());
    c.extend_from_slice(&sequence.to_le_bytes());
    c.extend_from_slice(&m.1.to_le_bytes());
    c.extend_from_slice(&m.1.to_le_bytes());
    c.extend_from_slice(&m.2);
    record(OP_MESSAGE, &c)
}

/// Compress chunk records; unknown identifiers are stored as-is.
fn compress(compression: &str, records: &[u8]) -> Vec<u8> {
    match compression {
        "zstd" => zstd::bulk::compress(records, 3).unwrap(),
        "lz4" => {
            let mut encoder = lz4_flex::frame::FrameEncoder::new(Vec::new());
            encoder.write_all(records).unwrap();
            encoder.finish().unwrap()
        }
        "reverse" => records.iter().rev().copied().collect(),
        _ => records.to_vec(),
    }
}

/// Byte offsets of every top-level chunk record in a built file.
pub fn chunk_offsets(bytes: &[u8]) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut pos = 8;
    while pos + 9 <= bytes.len() {
        let opcode = bytes[pos];
        if opcode == 0x02 {
            break;
        }
        let len = u64::from_le_bytes(bytes[pos + 1..pos + 9].try_into().unwrap()) as usize;
        if opcode == 0x06 {
            offsets.push(pos);
        }
        pos += 9 + len;
    }
    offsets
}

/// Overwrite the uncompressed size declared by the chunk record at `offset`.
pub fn set_chunk_uncompressed_size(bytes: &mut [u8], offset: usize, size: u64) {
    let at = offset + 9 + 16;
    bytes[at..at + 8].copy_from_slice(&size.to_le_bytes());
}

// ============================================================================
// Temp Files
// ============================================================================

/// Write `bytes` to a fresh temp file; the directory is removed on drop.
pub fn temp_mcap(name: &str, bytes: &[u8]) -> (PathBuf, CleanupGuard) {
    let dir = tempfile::Builder::new()
        .prefix("robosource_test_")
        .tempdir()
        .unwrap();
    let path = dir.path().join(format!("{}.mcap", name));
    fs::write(&path, bytes).unwrap();
    (path, CleanupGuard(dir))
}

#[derive(Debug)]
pub struct CleanupGuard(pub tempfile::TempDir);

impl CleanupGuard {
    pub fn path(&self) -> &std::path::Path {
        self.0.path()
    }
}

// ============================================================================
// Iteration Helpers
// ============================================================================

/// Drain an iterator, stopping at the first error.
pub fn collect(iter: MessageIterator) -> Result<Vec<MessageEvent>> {
    iter.collect()
}

/// Drain an iterator, keeping the messages yielded before an error.
pub fn collect_until_error(iter: MessageIterator) -> (Vec<MessageEvent>, Option<robosource::SourceError>) {
    let mut events = Vec::new();
    for item in iter {
        match item {
            Ok(event) => events.push(event),
            Err(e) => return (events, Some(e)),
        }
    }
    (events, None)
}

pub fn times(events: &[MessageEvent]) -> Vec<u64> {
    events.iter().map(|e| e.log_time).collect()
}

pub fn topic_times(events: &[MessageEvent]) -> Vec<(String, u64)> {
    events
        .iter()
        .map(|e| (e.topic.clone(), e.log_time))
        .collect()
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Behavior knobs for [`TestServer`].
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub accept_ranges: bool,
    pub content_length: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            accept_ranges: true,
            content_length: true,
        }
    }
}

struct ServerState {
    body: Bytes,
    options: ServerOptions,
    requests: Mutex<Vec<String>>,
    served: AtomicUsize,
}

/// axum server on its own runtime thread, serving one body with HEAD,
/// GET and Range support.
pub struct TestServer {
    pub url: String,
    state: Arc<ServerState>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub fn start(body: Vec<u8>) -> Self {
        Self::start_with(body, ServerOptions::default())
    }

    pub fn start_with(body: Vec<u8>, options: ServerOptions) -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let url = format!("http://{}/recording.mcap", listener.local_addr().unwrap());

        let state = Arc::new(ServerState {
            body: Bytes::from(body),
            options,
            requests: Mutex::new(Vec::new()),
            served: AtomicUsize::new(0),
        });
        let router = Router::new()
            .route("/recording.mcap", get(serve_recording))
            .with_state(Arc::clone(&state));

        let (tx, rx) = oneshot::channel::<()>();
        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        let _ = rx.await;
                    })
                    .await
                    .ok();
            });
        });

        Self {
            url,
            state,
            shutdown: Some(tx),
        }
    }

    /// Requests seen so far, e.g. `"GET bytes=0-7"` or `"HEAD"`.
    pub fn requests(&self) -> Vec<String> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Body bytes sent so far.
    pub fn bytes_served(&self) -> usize {
        self.state.served.load(Ordering::SeqCst)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn serve_recording(
    State(state): State<Arc<ServerState>>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.requests.lock().unwrap().push(match &range {
        Some(r) => format!("{method} {r}"),
        None => method.to_string(),
    });

    let total = state.body.len();
    let requested = range
        .as_deref()
        .filter(|_| state.options.accept_ranges)
        .and_then(parse_range);
    let (status, slice, content_range) = match requested {
        Some((start, end)) if start < total && start <= end => {
            let end = end.min(total - 1);
            (
                StatusCode::PARTIAL_CONTENT,
                state.body.slice(start..=end),
                Some(format!("bytes {start}-{end}/{total}")),
            )
        }
        Some(_) => (StatusCode::RANGE_NOT_SATISFIABLE, Bytes::new(), None),
        None => (StatusCode::OK, state.body.clone(), None),
    };

    let mut builder = Response::builder().status(status);
    if state.options.accept_ranges {
        builder = builder.header(header::ACCEPT_RANGES, "bytes");
    }
    if let Some(cr) = content_range {
        builder = builder.header(header::CONTENT_RANGE, cr);
    }

    let is_head = method == Method::HEAD;
    if !is_head {
        state.served.fetch_add(slice.len(), Ordering::SeqCst);
    }

    let body = if !state.options.content_length {
        // A streamed body has no known length, so no Content-Length is sent.
        let chunks = if is_head { Vec::new() } else { vec![slice] };
        Body::from_stream(futures::stream::iter(
            chunks.into_iter().map(Ok::<_, std::io::Error>),
        ))
    } else if is_head {
        builder = builder.header(header::CONTENT_LENGTH, slice.len());
        Body::empty()
    } else {
        Body::from(slice)
    };
    builder.body(body).unwrap()
}

fn parse_range(value: &str) -> Option<(usize, usize)> {
    let range = value.strip_prefix("bytes=")?;
    let (start, end) = range.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}
