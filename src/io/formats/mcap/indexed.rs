// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Indexed MCAP reader.
//!
//! Reads the footer and summary section at the end of the file and then
//! fetches only the chunks a query needs. Works over any [`Readable`], so
//! the same code serves memory-mapped files and HTTP range requests.
//!
//! # Ordering
//!
//! Messages are yielded in `(log_time, chunk order, offset in chunk)` order,
//! where chunk order is the summary's chunk indexes sorted by start time.
//! Chunks are loaded lazily: a chunk is read once the merge front reaches
//! its start time, so overlapping chunks are merged correctly while
//! sequential files keep a single chunk resident.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, warn};

use crate::core::{Result, SourceConfig, SourceError};
use crate::io::decompress::DecompressHandlers;
use crate::io::filter::ChannelFilter;
use crate::io::metadata::{resolve_event, AccessPath, Initialization, MessageEvent};
use crate::io::readable::Readable;
use crate::io::traits::{BackfillArgs, MessageIterator, MessageIteratorArgs, MessageSource};

use super::chunk::{chunk_messages, decompress_chunk, ChunkMessage};
use super::constants::{
    MCAP_MAGIC, OPCODE_LEN_SIZE, OP_CHANNEL, OP_CHUNK, OP_CHUNK_INDEX, OP_FOOTER, OP_MESSAGE,
    OP_SCHEMA, OP_STATISTICS,
};
use super::records::{
    parse_channel, parse_chunk, parse_chunk_index, parse_footer, parse_message, parse_schema,
    parse_statistics, peek_message_time, ChunkIndex, MessageRecord, RecordIter, Statistics,
    FOOTER_AND_MAGIC_SIZE, FOOTER_RECORD_SIZE,
};

/// Parsed summary section.
#[derive(Debug)]
struct SummaryIndex {
    initialization: Initialization,
    /// Sorted by `(message_start_time, chunk_start_offset)`
    chunks: Vec<ChunkIndex>,
}

/// MCAP reader driven by the summary section's chunk indexes.
pub struct IndexedMcapReader<R: Readable> {
    readable: Arc<R>,
    handlers: Arc<DecompressHandlers>,
    validate_crcs: bool,
    index: Option<Arc<SummaryIndex>>,
}

impl<R: Readable> IndexedMcapReader<R> {
    /// Create a reader. Nothing is read until [`initialize`](MessageSource::initialize).
    pub fn new(readable: R, mut handlers: DecompressHandlers, config: &SourceConfig) -> Self {
        handlers.set_limit(handlers.limit().min(config.max_record_size));
        Self {
            readable: Arc::new(readable),
            handlers: Arc::new(handlers),
            validate_crcs: config.validate_crcs,
            index: None,
        }
    }

    /// Whether the index can serve queries.
    ///
    /// A file whose summary lists no chunks or no channels parses fine but
    /// cannot be played through its index.
    pub fn is_usable(&self) -> bool {
        self.index.as_ref().is_some_and(|index| {
            !index.chunks.is_empty() && !index.initialization.channels.is_empty()
        })
    }

    /// Chunk indexes sorted by start time; empty before initialization.
    pub fn chunk_indexes(&self) -> &[ChunkIndex] {
        self.index.as_ref().map_or(&[], |index| index.chunks.as_slice())
    }

    /// The initialization result, once available.
    pub fn initialization(&self) -> Option<&Initialization> {
        self.index.as_ref().map(|index| &index.initialization)
    }

    fn read_index(&self) -> Result<SummaryIndex> {
        let size = self.readable.size()?;
        let magic_len = MCAP_MAGIC.len() as u64;
        if size < magic_len + FOOTER_AND_MAGIC_SIZE {
            return Err(SourceError::malformed(
                "Footer",
                None,
                format!("file is {size} bytes, too small to hold magic and footer"),
            ));
        }

        let head = self.readable.read(0, magic_len)?;
        if head != MCAP_MAGIC {
            return Err(SourceError::invalid_magic(&head));
        }

        let footer_offset = size - FOOTER_AND_MAGIC_SIZE;
        let tail = self.readable.read(footer_offset, FOOTER_AND_MAGIC_SIZE)?;
        let (footer_record, trailing_magic) = tail.split_at(FOOTER_RECORD_SIZE as usize);
        if trailing_magic != MCAP_MAGIC {
            return Err(SourceError::invalid_magic(trailing_magic));
        }
        if footer_record[0] != OP_FOOTER {
            return Err(SourceError::malformed(
                "Footer",
                Some(footer_offset),
                format!("expected opcode {OP_FOOTER:#04x}, found {:#04x}", footer_record[0]),
            ));
        }
        let declared = LittleEndian::read_u64(&footer_record[1..OPCODE_LEN_SIZE]);
        if declared != FOOTER_RECORD_SIZE - OPCODE_LEN_SIZE as u64 {
            return Err(SourceError::malformed(
                "Footer",
                Some(footer_offset),
                format!("declares {declared} content bytes"),
            ));
        }
        let footer = parse_footer(&footer_record[OPCODE_LEN_SIZE..])
            .map_err(|e| e.at_offset(footer_offset))?;

        if footer.summary_start == 0 {
            debug!(
                context = "IndexedMcapReader",
                "Footer points to no summary section"
            );
            return Ok(SummaryIndex {
                initialization: Initialization::empty(AccessPath::Indexed),
                chunks: Vec::new(),
            });
        }
        if footer.summary_start < magic_len || footer.summary_start > footer_offset {
            return Err(SourceError::invalid_index(format!(
                "summary start {} outside data range {magic_len}..{footer_offset}",
                footer.summary_start
            )));
        }

        let summary = self
            .readable
            .read(footer.summary_start, footer_offset - footer.summary_start)?;

        if self.validate_crcs && footer.summary_crc != 0 {
            // Covers the summary section and the footer up to the CRC field.
            let mut hasher = crc32fast::Hasher::new();
            hasher.update(&summary);
            hasher.update(&footer_record[..FOOTER_RECORD_SIZE as usize - 4]);
            let actual = hasher.finalize();
            if actual != footer.summary_crc {
                return Err(SourceError::invalid_index(format!(
                    "summary CRC mismatch: expected {:#010x}, computed {actual:#010x}",
                    footer.summary_crc
                )));
            }
        }

        let mut initialization = Initialization::empty(AccessPath::Indexed);
        let mut chunks = Vec::new();
        let mut stats: Option<Statistics> = None;

        for record in RecordIter::with_base_offset(&summary, footer.summary_start) {
            let record = record?;
            let at = |e: SourceError| e.at_offset(record.offset);
            match record.opcode {
                OP_SCHEMA => {
                    if let Some(schema) = parse_schema(record.content).map_err(at)? {
                        initialization.schemas.insert(schema.id, schema);
                    }
                }
                OP_CHANNEL => {
                    let channel = parse_channel(record.content).map_err(at)?;
                    initialization.channels.insert(channel.id, channel);
                }
                OP_CHUNK_INDEX => chunks.push(parse_chunk_index(record.content).map_err(at)?),
                OP_STATISTICS => stats = Some(parse_statistics(record.content).map_err(at)?),
                _ => {}
            }
        }

        for chunk in &chunks {
            validate_chunk_index(chunk, footer.summary_start)?;
        }
        for channel in initialization.channels.values() {
            if channel.schema_id != 0 && !initialization.schemas.contains_key(&channel.schema_id)
            {
                return Err(SourceError::invalid_index(format!(
                    "channel {} ('{}') references missing schema {}",
                    channel.id, channel.topic, channel.schema_id
                )));
            }
        }

        chunks.sort_by_key(|c| (c.message_start_time, c.chunk_start_offset));

        match &stats {
            Some(stats) if stats.message_count > 0 => {
                initialization.start_time = Some(stats.message_start_time);
                initialization.end_time = Some(stats.message_end_time);
            }
            _ => {
                initialization.start_time = chunks.iter().map(|c| c.message_start_time).min();
                initialization.end_time = chunks.iter().map(|c| c.message_end_time).max();
            }
        }
        if let Some(stats) = &stats {
            initialization.message_count = stats.message_count;
            for (id, count) in &stats.channel_message_counts {
                if let Some(channel) = initialization.channels.get_mut(id) {
                    channel.message_count = *count;
                }
            }
        }

        debug!(
            context = "IndexedMcapReader",
            chunks = chunks.len(),
            channels = initialization.channels.len(),
            schemas = initialization.schemas.len(),
            has_statistics = stats.is_some(),
            "Read summary section"
        );

        Ok(SummaryIndex {
            initialization,
            chunks,
        })
    }
}

fn validate_chunk_index(chunk: &ChunkIndex, data_end: u64) -> Result<()> {
    let start = chunk.chunk_start_offset;
    let fits = start >= MCAP_MAGIC.len() as u64
        && chunk.chunk_length >= OPCODE_LEN_SIZE as u64
        && start
            .checked_add(chunk.chunk_length)
            .is_some_and(|end| end <= data_end);
    if !fits {
        return Err(SourceError::invalid_index(format!(
            "chunk at offset {start} with length {} lies outside the data section ending at {data_end}",
            chunk.chunk_length
        )));
    }
    if chunk.message_start_time > chunk.message_end_time {
        return Err(SourceError::invalid_index(format!(
            "chunk at offset {start} starts at {} after its end {}",
            chunk.message_start_time, chunk.message_end_time
        )));
    }
    Ok(())
}

/// Read one chunk record through its index entry and return its records.
fn read_chunk<R: Readable + ?Sized>(
    readable: &R,
    index: &ChunkIndex,
    handlers: &DecompressHandlers,
    validate_crcs: bool,
) -> Result<Vec<u8>> {
    let offset = index.chunk_start_offset;
    let bytes = readable.read(offset, index.chunk_length)?;
    if bytes[0] != OP_CHUNK {
        return Err(SourceError::malformed(
            "Chunk",
            Some(offset),
            format!("expected opcode {OP_CHUNK:#04x}, found {:#04x}", bytes[0]),
        ));
    }
    let declared = LittleEndian::read_u64(&bytes[1..OPCODE_LEN_SIZE]);
    let available = (bytes.len() - OPCODE_LEN_SIZE) as u64;
    if declared > available {
        return Err(SourceError::malformed(
            "Chunk",
            Some(offset),
            format!("declares {declared} bytes but the index allows {available}"),
        ));
    }
    let content = &bytes[OPCODE_LEN_SIZE..OPCODE_LEN_SIZE + declared as usize];
    let chunk = parse_chunk(content).map_err(|e| e.at_offset(offset))?;
    decompress_chunk(&chunk, handlers, validate_crcs)
}

/// Latest message at or before `time` for each slot, where `slots` maps a
/// channel id to the slot of its topic.
///
/// Returns `(log_time, offset, message)` per slot; later offsets win ties.
fn latest_in_chunk(
    records: &[u8],
    slots: &HashMap<u16, usize>,
    slot_count: usize,
    time: u64,
) -> Result<Vec<Option<(u64, u64, MessageRecord)>>> {
    let mut best: Vec<Option<(u64, u64, &[u8])>> = vec![None; slot_count];
    for record in RecordIter::new(records) {
        let record = record?;
        if record.opcode != OP_MESSAGE {
            continue;
        }
        let (channel_id, log_time) = peek_message_time(record.content)?;
        if log_time > time {
            continue;
        }
        let Some(&slot) = slots.get(&channel_id) else {
            continue;
        };
        if best[slot].map_or(true, |(t, off, _)| (log_time, record.offset) > (t, off)) {
            best[slot] = Some((log_time, record.offset, record.content));
        }
    }
    best.into_iter()
        .map(|b| {
            b.map(|(t, off, content)| parse_message(content).map(|m| (t, off, m)))
                .transpose()
        })
        .collect()
}

/// Backfill state for one requested topic.
struct BackfillTopic {
    channel_ids: HashSet<u16>,
    /// Best `(log_time, chunk ordinal, offset)` seen so far
    best: Option<((u64, usize, u64), MessageRecord)>,
}

impl BackfillTopic {
    /// Whether a chunk whose messages end at `bound` could still improve on
    /// the current best.
    fn wants(&self, bound: u64) -> bool {
        self.best.as_ref().map_or(true, |((t, _, _), _)| bound >= *t)
    }
}

impl<R: Readable + 'static> MessageSource for IndexedMcapReader<R> {
    fn initialize(&mut self) -> Result<Initialization> {
        if self.index.is_some() {
            return Err(SourceError::AlreadyInitialized);
        }
        let index = self.read_index()?;
        let initialization = index.initialization.clone();
        self.index = Some(Arc::new(index));
        Ok(initialization)
    }

    fn message_iterator(&mut self, args: MessageIteratorArgs) -> Result<MessageIterator> {
        let index = self
            .index
            .clone()
            .ok_or_else(|| SourceError::not_initialized("message_iterator"))?;

        let filter =
            ChannelFilter::from_topics(args.topics.as_ref(), &index.initialization.channels);
        let (start, end) = (args.start_or_min(), args.end_or_max());

        let pending: VecDeque<usize> = if filter.is_empty() || start > end {
            VecDeque::new()
        } else {
            index
                .chunks
                .iter()
                .enumerate()
                .filter(|(_, c)| c.overlaps(start, end))
                .filter(|(_, c)| filter.channel_ids().map_or(true, |ids| c.may_contain_any(ids)))
                .map(|(i, _)| i)
                .collect()
        };

        debug!(
            context = "IndexedMcapReader",
            selected_chunks = pending.len(),
            total_chunks = index.chunks.len(),
            start,
            end,
            "Planned message iteration"
        );

        Ok(Box::new(IndexedMessageIter {
            readable: Arc::clone(&self.readable),
            handlers: Arc::clone(&self.handlers),
            validate_crcs: self.validate_crcs,
            index,
            filter,
            start,
            end,
            pending,
            loaded: HashMap::new(),
            heap: BinaryHeap::new(),
            warned_channels: HashSet::new(),
            done: false,
        }))
    }

    fn get_backfill_messages(&mut self, args: BackfillArgs) -> Result<Vec<MessageEvent>> {
        let index = self
            .index
            .clone()
            .ok_or_else(|| SourceError::not_initialized("get_backfill_messages"))?;
        let channels = &index.initialization.channels;
        let time = args.time;

        let mut topics: Vec<&String> = args.topics.iter().collect();
        topics.sort();
        let mut wanted: Vec<BackfillTopic> = topics
            .into_iter()
            .map(|topic| BackfillTopic {
                channel_ids: channels
                    .values()
                    .filter(|c| &c.topic == topic)
                    .map(|c| c.id)
                    .collect(),
                best: None,
            })
            .filter(|w| !w.channel_ids.is_empty())
            .collect();

        let mut candidates: Vec<usize> = index
            .chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                c.message_start_time <= time
                    && wanted.iter().any(|w| c.may_contain_any(&w.channel_ids))
            })
            .map(|(i, _)| i)
            .collect();
        candidates.sort_by_key(|&i| Reverse((index.chunks[i].message_end_time.min(time), i)));

        // One pass over the candidates, newest first. Each chunk is read at
        // most once and dropped before the next.
        let mut chunks_read = 0usize;
        for ordinal in candidates {
            let chunk = &index.chunks[ordinal];
            let bound = chunk.message_end_time.min(time);
            if !wanted.iter().any(|w| w.wants(bound)) {
                break;
            }
            let needy: Vec<usize> = wanted
                .iter()
                .enumerate()
                .filter(|(_, w)| w.wants(bound) && chunk.may_contain_any(&w.channel_ids))
                .map(|(k, _)| k)
                .collect();
            if needy.is_empty() {
                continue;
            }

            let records = read_chunk(&*self.readable, chunk, &self.handlers, self.validate_crcs)?;
            chunks_read += 1;

            let mut slots = HashMap::new();
            for (slot, &k) in needy.iter().enumerate() {
                for &id in &wanted[k].channel_ids {
                    slots.insert(id, slot);
                }
            }
            let found = latest_in_chunk(&records, &slots, needy.len(), time)?;
            for (&k, found) in needy.iter().zip(found) {
                let Some((t, offset, message)) = found else {
                    continue;
                };
                let key = (t, ordinal, offset);
                let best = &mut wanted[k].best;
                if best.as_ref().map_or(true, |(current, _)| key > *current) {
                    *best = Some((key, message));
                }
            }
        }

        let mut events = Vec::new();
        for topic in wanted {
            let Some((_, message)) = topic.best else {
                continue;
            };
            if let Some(channel) = channels.get(&message.channel_id) {
                events.push(resolve_event(
                    channel,
                    &index.initialization.schemas,
                    message,
                ));
            }
        }

        debug!(
            context = "IndexedMcapReader",
            time,
            requested = args.topics.len(),
            found = events.len(),
            chunks_read,
            "Backfill complete"
        );
        Ok(events)
    }
}

/// Lazy k-way merge over the selected chunks.
struct IndexedMessageIter<R: Readable> {
    readable: Arc<R>,
    handlers: Arc<DecompressHandlers>,
    validate_crcs: bool,
    index: Arc<SummaryIndex>,
    filter: ChannelFilter,
    start: u64,
    end: u64,
    /// Chunk ordinals not yet loaded, in start-time order
    pending: VecDeque<usize>,
    /// Remaining messages of loaded chunks, sorted
    loaded: HashMap<usize, VecDeque<ChunkMessage>>,
    /// Head of each loaded chunk: `(log_time, ordinal, offset)`
    heap: BinaryHeap<Reverse<(u64, usize, u64)>>,
    warned_channels: HashSet<u16>,
    done: bool,
}

impl<R: Readable> IndexedMessageIter<R> {
    /// Whether the next pending chunk may hold a message ordered before the heap head.
    fn needs_load(&self) -> bool {
        let Some(&next) = self.pending.front() else {
            return false;
        };
        match self.heap.peek() {
            Some(Reverse((log_time, _, _))) => {
                self.index.chunks[next].message_start_time <= *log_time
            }
            None => true,
        }
    }

    fn load_chunk(&mut self, ordinal: usize) -> Result<()> {
        let chunk_index = &self.index.chunks[ordinal];
        let records = read_chunk(
            &*self.readable,
            chunk_index,
            &self.handlers,
            self.validate_crcs,
        )?;

        let channels = &self.index.initialization.channels;
        let filter = &self.filter;
        let (start, end) = (self.start, self.end);
        let warned = &mut self.warned_channels;
        let offset = chunk_index.chunk_start_offset;

        let mut messages = chunk_messages(&records, |channel_id, log_time| {
            if log_time < start || log_time > end || !filter.allows_channel(channel_id) {
                return false;
            }
            if !channels.contains_key(&channel_id) {
                if warned.insert(channel_id) {
                    warn!(
                        context = "IndexedMcapReader",
                        channel_id,
                        chunk_offset = offset,
                        "Skipping messages on a channel missing from the summary"
                    );
                }
                return false;
            }
            true
        })
        .map_err(|e| e.at_offset(offset))?;

        messages.sort_by_key(|m| (m.message.log_time, m.offset));
        if let Some(head) = messages.first() {
            self.heap
                .push(Reverse((head.message.log_time, ordinal, head.offset)));
            self.loaded.insert(ordinal, messages.into());
        }
        Ok(())
    }
}

impl<R: Readable> Iterator for IndexedMessageIter<R> {
    type Item = Result<MessageEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        while self.needs_load() {
            let ordinal = self.pending.pop_front()?;
            if let Err(e) = self.load_chunk(ordinal) {
                warn!(
                    context = "IndexedMcapReader",
                    chunk_offset = self.index.chunks[ordinal].chunk_start_offset,
                    error = %e,
                    "Failed to load chunk, ending iteration"
                );
                self.done = true;
                self.loaded.clear();
                self.heap.clear();
                return Some(Err(e));
            }
        }

        let Some(Reverse((_, ordinal, _))) = self.heap.pop() else {
            self.done = true;
            return None;
        };
        let queue = self.loaded.get_mut(&ordinal)?;
        let chunk_message = queue.pop_front()?;
        match queue.front() {
            Some(next) => self
                .heap
                .push(Reverse((next.message.log_time, ordinal, next.offset))),
            None => {
                self.loaded.remove(&ordinal);
            }
        }

        let channel = self
            .index
            .initialization
            .channels
            .get(&chunk_message.message.channel_id)?;
        Some(Ok(resolve_event(
            channel,
            &self.index.initialization.schemas,
            chunk_message.message,
        )))
    }
}
