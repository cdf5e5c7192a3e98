//! Shared-memory protocol: the fixed binary layout and the seqlock
//! writer/reader pair that publishes it.

pub mod layout;
pub mod seqlock;

pub use layout::{EventRecord, LayoutError, SnapshotFrame, FLAG_CLEAR, FLAG_PAUSED, SEGMENT_NAME, SEGMENT_SIZE};
pub use seqlock::{
    EventBatch, EventCursor, HeapSegment, ReadError, SegmentMemory, StateReader, StateSnapshot, StateWriter,
};
