//! Single-writer / multi-reader publication over a shared byte region.
//!
//! # How the seqlock works (for beginners)
//!
//! The writer never waits for readers. Instead, the snapshot region carries a
//! sequence number:
//!
//! 1. The writer makes the sequence **odd** ("write in progress"),
//! 2. writes every field,
//! 3. makes the sequence **even** again with release ordering.
//!
//! A reader loads the sequence, copies the fields, and loads the sequence a
//! second time. If either value was odd or the two differ, the copy may mix
//! two publishes and is thrown away; the reader simply tries again.
//!
//! The event ring uses a simpler rule: a record is written first, then the
//! 64-bit write head is advanced with release ordering. Readers compare their
//! cursor with the head; a gap larger than the ring capacity means records
//! were overwritten before they were read.
//!
//! # Memory access
//!
//! The region may be mapped into other processes, so every access goes
//! through `AtomicU32` / `AtomicU64` views of the mapped words. Nothing in
//! this module ever forms a `&mut [u8]` over shared memory.

use std::sync::atomic::{fence, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;

use super::layout::{
    event_slot_offset, validate_header, EventRecord, LayoutError, SnapshotFrame, EVENT_CAPACITY,
    EVENT_RECORD_SIZE, MAGIC, OFFSET_EVENT_CAPACITY, OFFSET_EVENT_HEAD, OFFSET_EVENT_RECORD_SIZE,
    OFFSET_MAGIC, OFFSET_SEQ, OFFSET_VERSION, PROTOCOL_VERSION, SEGMENT_SIZE, SNAPSHOT_SIZE,
};

/// Reader attempts before a permanently odd sequence is reported as stalled.
const MAX_READ_ATTEMPTS: u32 = 10_000;

// ── Memory abstraction ────────────────────────────────────────────────────────

/// A byte region that the writer and readers share.
///
/// # Safety
///
/// Implementors guarantee that `as_ptr()` is non-null, 8-byte aligned, and
/// valid for reads and writes of `len()` bytes for as long as `self` lives,
/// and that the region is only ever accessed through atomic operations.
pub unsafe trait SegmentMemory: Send + Sync {
    fn as_ptr(&self) -> *mut u8;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// SAFETY: forwards to the inner implementation, which upholds the contract.
unsafe impl<T: SegmentMemory + ?Sized> SegmentMemory for Arc<T> {
    fn as_ptr(&self) -> *mut u8 {
        (**self).as_ptr()
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}

/// An in-process segment backed by heap words. Used by tests, benches and
/// platforms without named mappings.
pub struct HeapSegment {
    words: Box<[AtomicU64]>,
}

impl HeapSegment {
    /// Allocates a zeroed region of at least `len` bytes.
    pub fn new(len: usize) -> Self {
        let words = (0..len.div_ceil(8)).map(|_| AtomicU64::new(0)).collect();
        Self { words }
    }

    /// A zeroed region sized for the full protocol segment.
    pub fn for_protocol() -> Self {
        Self::new(SEGMENT_SIZE)
    }
}

// SAFETY: the boxed slice of `AtomicU64` is 8-byte aligned, lives as long as
// `self`, and is only reachable through atomic views.
unsafe impl SegmentMemory for HeapSegment {
    fn as_ptr(&self) -> *mut u8 {
        self.words.as_ptr() as *mut u8
    }

    fn len(&self) -> usize {
        self.words.len() * 8
    }
}

/// Atomic word views over a [`SegmentMemory`].
struct Region<M> {
    mem: M,
}

impl<M: SegmentMemory> Region<M> {
    fn new(mem: M) -> Result<Self, LayoutError> {
        if mem.len() < SEGMENT_SIZE {
            return Err(LayoutError::SizeMismatch {
                expected: SEGMENT_SIZE,
                actual: mem.len(),
            });
        }
        Ok(Self { mem })
    }

    fn u32_at(&self, offset: usize) -> &AtomicU32 {
        debug_assert!(offset % 4 == 0 && offset + 4 <= SEGMENT_SIZE);
        // SAFETY: `offset` is 4-aligned and in bounds (checked in `new`), the
        // base is 8-aligned per the `SegmentMemory` contract, and the region
        // is only accessed atomically.
        unsafe { &*(self.mem.as_ptr().add(offset) as *const AtomicU32) }
    }

    fn u64_at(&self, offset: usize) -> &AtomicU64 {
        debug_assert!(offset % 8 == 0 && offset + 8 <= SEGMENT_SIZE);
        // SAFETY: as for `u32_at`, with 8-byte alignment.
        unsafe { &*(self.mem.as_ptr().add(offset) as *const AtomicU64) }
    }

    fn load_u32(&self, offset: usize, order: Ordering) -> u32 {
        u32::from_le(self.u32_at(offset).load(order))
    }

    fn store_u32(&self, offset: usize, value: u32, order: Ordering) {
        self.u32_at(offset).store(value.to_le(), order);
    }

    fn load_u64(&self, offset: usize, order: Ordering) -> u64 {
        u64::from_le(self.u64_at(offset).load(order))
    }

    fn store_u64(&self, offset: usize, value: u64, order: Ordering) {
        self.u64_at(offset).store(value.to_le(), order);
    }

    /// Copies `bytes` into the region word by word, skipping `skip` if given.
    fn store_bytes(&self, offset: usize, bytes: &[u8], skip: Option<usize>) {
        for (i, chunk) in bytes.chunks_exact(4).enumerate() {
            let at = offset + i * 4;
            if Some(at) == skip {
                continue;
            }
            let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            self.u32_at(at).store(word, Ordering::Relaxed);
        }
    }

    fn load_bytes(&self, offset: usize, out: &mut [u8]) {
        for (i, chunk) in out.chunks_exact_mut(4).enumerate() {
            let word = self.u32_at(offset + i * 4).load(Ordering::Relaxed);
            chunk.copy_from_slice(&word.to_ne_bytes());
        }
    }
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// The single publisher of a segment.
pub struct StateWriter<M: SegmentMemory> {
    region: Region<M>,
    scratch: Box<[u8; SNAPSHOT_SIZE]>,
    published: u64,
}

impl<M: SegmentMemory> StateWriter<M> {
    /// Takes ownership of `mem` and stamps the protocol header.
    ///
    /// A region that already carries a v3 header keeps its sequence number
    /// and event head, so readers attached to a previous writer instance see
    /// a continuous stream.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::SizeMismatch`] when `mem` is too small.
    pub fn new(mem: M) -> Result<Self, LayoutError> {
        let region = Region::new(mem)?;

        let resumed = region.load_u32(OFFSET_MAGIC, Ordering::Relaxed) == MAGIC
            && region.load_u32(OFFSET_VERSION, Ordering::Relaxed) == PROTOCOL_VERSION;
        if !resumed {
            region.store_u32(OFFSET_SEQ, 0, Ordering::Relaxed);
            region.store_u64(OFFSET_EVENT_HEAD, 0, Ordering::Relaxed);
        }

        region.store_u32(OFFSET_EVENT_CAPACITY, EVENT_CAPACITY as u32, Ordering::Relaxed);
        region.store_u32(OFFSET_EVENT_RECORD_SIZE, EVENT_RECORD_SIZE as u32, Ordering::Relaxed);
        region.store_u32(OFFSET_VERSION, PROTOCOL_VERSION, Ordering::Relaxed);
        region.store_u32(OFFSET_MAGIC, MAGIC, Ordering::Release);

        Ok(Self {
            region,
            scratch: Box::new([0u8; SNAPSHOT_SIZE]),
            published: 0,
        })
    }

    /// Publishes `frame` under the seqlock. Returns the new (even) sequence.
    pub fn publish(&mut self, frame: &SnapshotFrame) -> u32 {
        let current = self.region.load_u32(OFFSET_SEQ, Ordering::Relaxed);
        let odd = if current % 2 == 0 {
            current.wrapping_add(1)
        } else {
            current.wrapping_add(2)
        };

        self.region.store_u32(OFFSET_SEQ, odd, Ordering::Relaxed);
        fence(Ordering::Release);

        frame.encode(odd, &mut self.scratch);
        self.region.store_bytes(0, &self.scratch[..], Some(OFFSET_SEQ));

        let even = odd.wrapping_add(1);
        self.region.store_u32(OFFSET_SEQ, even, Ordering::Release);
        self.published += 1;
        even
    }

    /// Appends one key transition to the event ring. Returns its sequence id.
    pub fn push_event(&mut self, vk: u8, is_down: bool, timestamp_ms: u64) -> u64 {
        let head = self.region.load_u64(OFFSET_EVENT_HEAD, Ordering::Relaxed);
        let record = EventRecord {
            seq: head,
            vk,
            is_down,
            flags: 0,
            timestamp_ms,
        };

        self.region.store_bytes(event_slot_offset(head), &record.encode(), None);
        self.region.store_u64(OFFSET_EVENT_HEAD, head.wrapping_add(1), Ordering::Release);
        head
    }

    /// Current sequence number.
    pub fn sequence(&self) -> u32 {
        self.region.load_u32(OFFSET_SEQ, Ordering::Relaxed)
    }

    /// Current event write head.
    pub fn event_head(&self) -> u64 {
        self.region.load_u64(OFFSET_EVENT_HEAD, Ordering::Relaxed)
    }

    /// Number of `publish` calls made by this writer.
    pub fn publish_count(&self) -> u64 {
        self.published
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// Errors surfaced by [`StateReader::read`].
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum ReadError {
    /// The segment no longer carries a v3 header.
    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// The sequence stayed odd for every attempt; the writer died mid-publish.
    #[error("writer stalled with sequence {0} in progress")]
    WriterStalled(u32),
}

/// A consistent copy of the snapshot region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    pub seq: u32,
    pub frame: SnapshotFrame,
}

/// Position of a reader in the event ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventCursor {
    pub next: u64,
}

/// Events read since the previous call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventBatch {
    pub events: Vec<EventRecord>,
    /// Records overwritten before this reader could see them.
    pub dropped: u64,
}

/// A consumer of a segment.
pub struct StateReader<M: SegmentMemory> {
    region: Region<M>,
}

impl<M: SegmentMemory> StateReader<M> {
    /// Attaches to `mem`, validating size, magic, version and ring geometry.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError`] when the segment is not a v3 segment; callers
    /// must treat that as a protocol mismatch and not read further.
    pub fn open(mem: M) -> Result<Self, LayoutError> {
        let region = Region::new(mem)?;

        let mut header = [0u8; 8];
        region.load_bytes(OFFSET_MAGIC, &mut header);
        fence(Ordering::Acquire);
        validate_header(&header, 8)?;

        let capacity = region.load_u32(OFFSET_EVENT_CAPACITY, Ordering::Relaxed);
        let record_size = region.load_u32(OFFSET_EVENT_RECORD_SIZE, Ordering::Relaxed);
        if capacity as usize != EVENT_CAPACITY || record_size as usize != EVENT_RECORD_SIZE {
            return Err(LayoutError::RingMismatch { capacity, record_size });
        }

        Ok(Self { region })
    }

    /// Reads a consistent snapshot, retrying torn copies.
    ///
    /// # Errors
    ///
    /// [`ReadError::WriterStalled`] if no consistent copy could be taken, or
    /// [`ReadError::Layout`] if the header changed underneath the reader.
    pub fn read(&self) -> Result<StateSnapshot, ReadError> {
        let mut buf = vec![0u8; SNAPSHOT_SIZE];
        let mut last_seen = 0;

        for attempt in 0..MAX_READ_ATTEMPTS {
            let before = self.region.load_u32(OFFSET_SEQ, Ordering::Acquire);
            last_seen = before;
            if before % 2 == 1 {
                backoff(attempt);
                continue;
            }

            self.region.load_bytes(0, &mut buf);
            fence(Ordering::Acquire);
            let after = self.region.load_u32(OFFSET_SEQ, Ordering::Relaxed);
            if before != after {
                backoff(attempt);
                continue;
            }

            let (_, frame) = SnapshotFrame::decode(&buf)?;
            return Ok(StateSnapshot { seq: before, frame });
        }

        Err(ReadError::WriterStalled(last_seen))
    }

    /// Current event write head.
    pub fn event_head(&self) -> u64 {
        self.region.load_u64(OFFSET_EVENT_HEAD, Ordering::Acquire)
    }

    /// A cursor positioned at the current head, so only future events are read.
    pub fn cursor_at_head(&self) -> EventCursor {
        EventCursor { next: self.event_head() }
    }

    /// Reads every event appended since `cursor` and advances it.
    pub fn read_events(&self, cursor: &mut EventCursor) -> EventBatch {
        let head = self.event_head();
        if cursor.next > head {
            // The writer restarted with a fresh ring.
            cursor.next = head;
            return EventBatch::default();
        }

        let capacity = EVENT_CAPACITY as u64;
        let start = cursor.next.max(head.saturating_sub(capacity));
        let mut dropped = start - cursor.next;

        let mut records = Vec::with_capacity((head - start) as usize);
        let mut raw = [0u8; EVENT_RECORD_SIZE];
        for seq in start..head {
            self.region.load_bytes(event_slot_offset(seq), &mut raw);
            records.push((seq, EventRecord::decode(&raw)));
        }

        fence(Ordering::Acquire);
        let oldest_intact = self
            .region
            .load_u64(OFFSET_EVENT_HEAD, Ordering::Relaxed)
            .saturating_sub(capacity);

        let mut events = Vec::with_capacity(records.len());
        for (seq, record) in records {
            if seq < oldest_intact || record.seq != seq {
                dropped += 1;
            } else {
                events.push(record);
            }
        }

        cursor.next = head;
        EventBatch { events, dropped }
    }
}

fn backoff(attempt: u32) {
    if attempt % 64 == 63 {
        std::thread::yield_now();
    } else {
        std::hint::spin_loop();
    }
}
