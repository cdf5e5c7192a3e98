//! Binary layout of the shared keyboard-state segment (protocol version 3).
//!
//! All integers are little-endian. Offsets are fixed and independent of Rust
//! struct layout; [`SnapshotFrame::encode`] and [`SnapshotFrame::decode`] are
//! the only places that know them.
//!
//! ```text
//!  off   size  field
//!    0      4  magic 0x4E59534B ("KSYN" read as little-endian bytes)
//!    4      4  version (3)
//!    8      4  seq (odd while a write is in progress)
//!   12      4  flags (bit0 paused, bit1 clear)
//!   16      4  active pid
//!   20      4  profile id
//!   24      4  profile mode
//!   28      4  reserved
//!   32      8  last tick (ms)
//!   40    256  key state
//!  296   1024  edge counters (u32 × 256)
//! 1320    256  target mask
//! 1576    256  block mask
//! 1832      8  event write head (u64)
//! 1840      4  event capacity
//! 1844      4  event record size
//! 1848  N×24  event records
//! ```
//!
//! Event record (24 bytes):
//!
//! ```text
//!  off size field
//!    0    8  seq (absolute write-head position)
//!    8    1  vk
//!    9    1  is_down
//!   10    2  flags
//!   12    4  reserved
//!   16    8  timestamp (ms)
//! ```

use thiserror::Error;

use crate::keymap::KEY_COUNT;

/// Segment magic, `"KSYN"` in memory order.
pub const MAGIC: u32 = 0x4E59_534B;
/// Protocol generation described by this module.
pub const PROTOCOL_VERSION: u32 = 3;
/// Default segment name on Windows.
pub const SEGMENT_NAME: &str = "Local\\KeySync.KeyboardState.V3";

/// Snapshot flag: synchronization is paused.
pub const FLAG_PAUSED: u32 = 0x1;
/// Snapshot flag: consumers must release every key now.
pub const FLAG_CLEAR: u32 = 0x2;

pub const OFFSET_MAGIC: usize = 0;
pub const OFFSET_VERSION: usize = 4;
pub const OFFSET_SEQ: usize = 8;
pub const OFFSET_FLAGS: usize = 12;
pub const OFFSET_ACTIVE_PID: usize = 16;
pub const OFFSET_PROFILE_ID: usize = 20;
pub const OFFSET_PROFILE_MODE: usize = 24;
pub const OFFSET_RESERVED: usize = 28;
pub const OFFSET_LAST_TICK: usize = 32;
pub const OFFSET_KEY_STATE: usize = 40;
pub const OFFSET_EDGES: usize = OFFSET_KEY_STATE + KEY_COUNT;
pub const OFFSET_TARGET_MASK: usize = OFFSET_EDGES + KEY_COUNT * 4;
pub const OFFSET_BLOCK_MASK: usize = OFFSET_TARGET_MASK + KEY_COUNT;
/// Size of the seqlock-protected snapshot region.
pub const SNAPSHOT_SIZE: usize = OFFSET_BLOCK_MASK + KEY_COUNT;

pub const OFFSET_EVENT_HEAD: usize = SNAPSHOT_SIZE;
pub const OFFSET_EVENT_CAPACITY: usize = OFFSET_EVENT_HEAD + 8;
pub const OFFSET_EVENT_RECORD_SIZE: usize = OFFSET_EVENT_CAPACITY + 4;
pub const OFFSET_EVENTS: usize = OFFSET_EVENT_RECORD_SIZE + 4;

/// Number of records in the event ring.
pub const EVENT_CAPACITY: usize = 256;
/// Size of one event record.
pub const EVENT_RECORD_SIZE: usize = 24;
/// Total segment size.
pub const SEGMENT_SIZE: usize = OFFSET_EVENTS + EVENT_CAPACITY * EVENT_RECORD_SIZE;

/// Layout and validation errors.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum LayoutError {
    /// The segment or buffer is smaller than the layout requires.
    #[error("segment size mismatch: need {expected} bytes, found {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Magic or version differ from this protocol generation.
    #[error("protocol mismatch: magic 0x{magic:08X}, version {version}")]
    ProtocolMismatch { magic: u32, version: u32 },

    /// The ring header disagrees with the compiled-in ring geometry.
    #[error("event ring mismatch: capacity {capacity}, record size {record_size}")]
    RingMismatch { capacity: u32, record_size: u32 },
}

// ── Snapshot ──────────────────────────────────────────────────────────────────

/// One published snapshot, excluding the seqlock sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFrame {
    pub flags: u32,
    pub active_pid: u32,
    pub profile_id: u32,
    pub profile_mode: u32,
    pub last_tick_ms: u64,
    pub key_state: [u8; KEY_COUNT],
    pub edges: [u32; KEY_COUNT],
    pub target_mask: [u8; KEY_COUNT],
    pub block_mask: [u8; KEY_COUNT],
}

impl SnapshotFrame {
    /// A frame with every field zeroed.
    pub fn zeroed() -> Self {
        Self {
            flags: 0,
            active_pid: 0,
            profile_id: 0,
            profile_mode: 0,
            last_tick_ms: 0,
            key_state: [0; KEY_COUNT],
            edges: [0; KEY_COUNT],
            target_mask: [0; KEY_COUNT],
            block_mask: [0; KEY_COUNT],
        }
    }

    pub fn is_paused(&self) -> bool {
        self.flags & FLAG_PAUSED != 0
    }

    pub fn is_clear(&self) -> bool {
        self.flags & FLAG_CLEAR != 0
    }

    /// Writes magic, version, `seq` and every field into `buf`.
    pub fn encode(&self, seq: u32, buf: &mut [u8; SNAPSHOT_SIZE]) {
        put_u32(buf, OFFSET_MAGIC, MAGIC);
        put_u32(buf, OFFSET_VERSION, PROTOCOL_VERSION);
        put_u32(buf, OFFSET_SEQ, seq);
        put_u32(buf, OFFSET_FLAGS, self.flags);
        put_u32(buf, OFFSET_ACTIVE_PID, self.active_pid);
        put_u32(buf, OFFSET_PROFILE_ID, self.profile_id);
        put_u32(buf, OFFSET_PROFILE_MODE, self.profile_mode);
        put_u32(buf, OFFSET_RESERVED, 0);
        put_u64(buf, OFFSET_LAST_TICK, self.last_tick_ms);
        buf[OFFSET_KEY_STATE..OFFSET_KEY_STATE + KEY_COUNT].copy_from_slice(&self.key_state);
        for (i, edge) in self.edges.iter().enumerate() {
            put_u32(buf, OFFSET_EDGES + i * 4, *edge);
        }
        buf[OFFSET_TARGET_MASK..OFFSET_TARGET_MASK + KEY_COUNT].copy_from_slice(&self.target_mask);
        buf[OFFSET_BLOCK_MASK..OFFSET_BLOCK_MASK + KEY_COUNT].copy_from_slice(&self.block_mask);
    }

    /// Validates the header of `buf` and decodes `(seq, frame)`.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError`] when `buf` is too short or carries a foreign
    /// magic or version.
    pub fn decode(buf: &[u8]) -> Result<(u32, Self), LayoutError> {
        validate_header(buf, SNAPSHOT_SIZE)?;

        let mut frame = Self::zeroed();
        frame.flags = get_u32(buf, OFFSET_FLAGS);
        frame.active_pid = get_u32(buf, OFFSET_ACTIVE_PID);
        frame.profile_id = get_u32(buf, OFFSET_PROFILE_ID);
        frame.profile_mode = get_u32(buf, OFFSET_PROFILE_MODE);
        frame.last_tick_ms = get_u64(buf, OFFSET_LAST_TICK);
        frame.key_state.copy_from_slice(&buf[OFFSET_KEY_STATE..OFFSET_KEY_STATE + KEY_COUNT]);
        for (i, edge) in frame.edges.iter_mut().enumerate() {
            *edge = get_u32(buf, OFFSET_EDGES + i * 4);
        }
        frame.target_mask.copy_from_slice(&buf[OFFSET_TARGET_MASK..OFFSET_TARGET_MASK + KEY_COUNT]);
        frame.block_mask.copy_from_slice(&buf[OFFSET_BLOCK_MASK..OFFSET_BLOCK_MASK + KEY_COUNT]);
        Ok((get_u32(buf, OFFSET_SEQ), frame))
    }
}

impl Default for SnapshotFrame {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Checks that `buf` holds at least `min_len` bytes and a v3 header.
///
/// # Errors
///
/// [`LayoutError::SizeMismatch`] or [`LayoutError::ProtocolMismatch`].
pub fn validate_header(buf: &[u8], min_len: usize) -> Result<(), LayoutError> {
    check_len(buf.len(), min_len.max(OFFSET_SEQ))?;
    let magic = get_u32(buf, OFFSET_MAGIC);
    let version = get_u32(buf, OFFSET_VERSION);
    if magic != MAGIC || version != PROTOCOL_VERSION {
        return Err(LayoutError::ProtocolMismatch { magic, version });
    }
    Ok(())
}

// ── Event records ─────────────────────────────────────────────────────────────

/// One key transition in the event ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    /// Absolute write-head position at which the record was appended.
    pub seq: u64,
    pub vk: u8,
    pub is_down: bool,
    pub flags: u16,
    pub timestamp_ms: u64,
}

impl EventRecord {
    pub fn encode(&self) -> [u8; EVENT_RECORD_SIZE] {
        let mut buf = [0u8; EVENT_RECORD_SIZE];
        put_u64(&mut buf, 0, self.seq);
        buf[8] = self.vk;
        buf[9] = u8::from(self.is_down);
        buf[10..12].copy_from_slice(&self.flags.to_le_bytes());
        put_u32(&mut buf, 12, 0);
        put_u64(&mut buf, 16, self.timestamp_ms);
        buf
    }

    pub fn decode(buf: &[u8; EVENT_RECORD_SIZE]) -> Self {
        Self {
            seq: get_u64(buf, 0),
            vk: buf[8],
            is_down: buf[9] != 0,
            flags: u16::from_le_bytes([buf[10], buf[11]]),
            timestamp_ms: get_u64(buf, 16),
        }
    }
}

/// Byte offset of the ring slot that holds sequence `seq`.
pub fn event_slot_offset(seq: u64) -> usize {
    OFFSET_EVENTS + (seq % EVENT_CAPACITY as u64) as usize * EVENT_RECORD_SIZE
}

// ── Byte helpers ──────────────────────────────────────────────────────────────

fn check_len(actual: usize, expected: usize) -> Result<(), LayoutError> {
    if actual < expected {
        return Err(LayoutError::SizeMismatch { expected, actual });
    }
    Ok(())
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn get_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn get_u64(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_match_documented_layout() {
        assert_eq!(OFFSET_EDGES, 296);
        assert_eq!(OFFSET_TARGET_MASK, 1320);
        assert_eq!(OFFSET_BLOCK_MASK, 1576);
        assert_eq!(SNAPSHOT_SIZE, 1832);
        assert_eq!(OFFSET_EVENT_HEAD, 1832);
        assert_eq!(OFFSET_EVENTS, 1848);
        assert_eq!(SEGMENT_SIZE, 1848 + 256 * 24);
        assert_eq!(OFFSET_EVENT_HEAD % 8, 0, "write head must be 8-byte aligned");
        assert_eq!(OFFSET_EVENTS % 8, 0);
    }

    #[test]
    fn test_header_bytes_are_little_endian_literals() {
        // Arrange
        let mut frame = SnapshotFrame::zeroed();
        frame.flags = FLAG_PAUSED | FLAG_CLEAR;
        frame.active_pid = 0x0000_1234;
        frame.profile_id = 0xAABB_CCDD;
        frame.profile_mode = 3;
        frame.last_tick_ms = 0x0102_0304_0506_0708;
        let mut buf = [0u8; SNAPSHOT_SIZE];

        // Act
        frame.encode(7, &mut buf);

        // Assert
        assert_eq!(
            &buf[..40],
            &[
                0x4B, 0x53, 0x59, 0x4E, // magic "KSYN"
                0x03, 0x00, 0x00, 0x00, // version
                0x07, 0x00, 0x00, 0x00, // seq
                0x03, 0x00, 0x00, 0x00, // flags
                0x34, 0x12, 0x00, 0x00, // pid
                0xDD, 0xCC, 0xBB, 0xAA, // profile id
                0x03, 0x00, 0x00, 0x00, // mode
                0x00, 0x00, 0x00, 0x00, // reserved
                0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01, // last tick
            ]
        );
    }

    #[test]
    fn test_key_arrays_land_at_fixed_offsets() {
        let mut frame = SnapshotFrame::zeroed();
        frame.key_state[0x41] = 0x81;
        frame.edges[0x41] = 0x0102_0304;
        frame.target_mask[0x41] = 1;
        frame.block_mask[0x7B] = 0x03;
        let mut buf = [0u8; SNAPSHOT_SIZE];

        frame.encode(0, &mut buf);

        assert_eq!(buf[40 + 0x41], 0x81);
        assert_eq!(&buf[296 + 0x41 * 4..296 + 0x41 * 4 + 4], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(buf[1320 + 0x41], 1);
        assert_eq!(buf[1576 + 0x7B], 0x03);
    }

    #[test]
    fn test_decode_reads_back_encoded_frame() {
        let mut frame = SnapshotFrame::zeroed();
        frame.flags = FLAG_PAUSED;
        frame.edges[255] = u32::MAX;
        frame.key_state[0] = 0x80;
        let mut buf = [0u8; SNAPSHOT_SIZE];
        frame.encode(42, &mut buf);

        let (seq, decoded) = SnapshotFrame::decode(&buf).expect("decode");

        assert_eq!(seq, 42);
        assert_eq!(decoded, frame);
        assert!(decoded.is_paused());
        assert!(!decoded.is_clear());
    }

    #[test]
    fn test_decode_rejects_foreign_magic_and_version() {
        let mut buf = [0u8; SNAPSHOT_SIZE];
        buf[4] = 2; // a v2 segment has no magic

        assert_eq!(
            SnapshotFrame::decode(&buf),
            Err(LayoutError::ProtocolMismatch { magic: 0, version: 2 })
        );
    }

    #[test]
    fn test_decode_rejects_short_buffer() {
        let buf = vec![0u8; 100];

        assert_eq!(
            SnapshotFrame::decode(&buf),
            Err(LayoutError::SizeMismatch { expected: SNAPSHOT_SIZE, actual: 100 })
        );
    }

    #[test]
    fn test_event_record_literal_bytes() {
        let record = EventRecord {
            seq: 0x0000_0000_0000_0102,
            vk: 0xDB,
            is_down: true,
            flags: 0,
            timestamp_ms: 0x10,
        };

        let bytes = record.encode();

        assert_eq!(
            bytes,
            [
                0x02, 0x01, 0, 0, 0, 0, 0, 0, // seq
                0xDB, 0x01, 0x00, 0x00, // vk, is_down, flags
                0, 0, 0, 0, // reserved
                0x10, 0, 0, 0, 0, 0, 0, 0, // timestamp
            ]
        );
        assert_eq!(EventRecord::decode(&bytes), record);
    }

    #[test]
    fn test_event_slot_offset_wraps_at_capacity() {
        assert_eq!(event_slot_offset(0), OFFSET_EVENTS);
        assert_eq!(event_slot_offset(1), OFFSET_EVENTS + EVENT_RECORD_SIZE);
        assert_eq!(event_slot_offset(EVENT_CAPACITY as u64), OFFSET_EVENTS);
    }
}
