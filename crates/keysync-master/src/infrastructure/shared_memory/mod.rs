//! The named shared-memory segment and the publishing channel over it.
//!
//! - [`SegmentProvider`] creates (or attaches to) the backing memory. The
//!   Windows provider maps a named file mapping; [`HeapSegmentProvider`]
//!   serves tests and platforms without named mappings.
//! - [`channel::SharedStateChannel`] owns the writer, retries a failed create
//!   at most once per second, and never lets a segment failure stop the
//!   engine.
//! - [`classify`] is the consumer-side check used by `keysync-master inspect`.

use std::sync::Arc;

use keysync_core::protocol::{HeapSegment, ReadError, SegmentMemory, StateReader, StateSnapshot};
use keysync_core::LayoutError;
use thiserror::Error;

pub mod channel;
pub mod mock;

#[cfg(target_os = "windows")]
pub mod windows;

/// Error type for segment creation and attachment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SegmentError {
    #[error("shared memory segment {name} does not exist")]
    NotFound { name: String },

    #[error("shared memory segment is {actual} bytes, expected at least {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("could not map shared memory segment {name}: {reason}")]
    Os { name: String, reason: String },

    #[error("named shared memory is not supported on this platform")]
    Unsupported,
}

/// Creates the memory a [`keysync_core::StateWriter`] publishes into.
pub trait SegmentProvider: Send {
    type Memory: SegmentMemory + 'static;

    /// Creates the segment, or attaches to it if it already exists.
    fn create(&mut self) -> Result<Self::Memory, SegmentError>;
}

/// Provider handing out one shared in-process segment.
#[derive(Clone)]
pub struct HeapSegmentProvider {
    segment: Arc<HeapSegment>,
}

impl HeapSegmentProvider {
    pub fn new() -> Self {
        Self {
            segment: Arc::new(HeapSegment::for_protocol()),
        }
    }

    /// The segment every `create` call returns, for attaching readers.
    pub fn segment(&self) -> Arc<HeapSegment> {
        Arc::clone(&self.segment)
    }
}

impl Default for HeapSegmentProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentProvider for HeapSegmentProvider {
    type Memory = Arc<HeapSegment>;

    fn create(&mut self) -> Result<Self::Memory, SegmentError> {
        Ok(Arc::clone(&self.segment))
    }
}

/// What a consumer finds when it looks at the segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentStatus {
    NotFound,
    SizeMismatch { expected: usize, actual: usize },
    /// Foreign magic or version, or a ring geometry this build cannot read.
    /// Holds [`LayoutError::ProtocolMismatch`] or [`LayoutError::RingMismatch`].
    ProtocolMismatch(LayoutError),
    /// The writer died mid-publish and the sequence stayed odd.
    Stalled { seq: u32 },
    Unavailable(String),
    Readable(StateSnapshot),
}

/// Validates an attached segment the way a consumer must before trusting it.
pub fn classify<M: SegmentMemory>(attached: Result<M, SegmentError>) -> SegmentStatus {
    let mem = match attached {
        Ok(mem) => mem,
        Err(SegmentError::NotFound { .. }) => return SegmentStatus::NotFound,
        Err(SegmentError::SizeMismatch { expected, actual }) => {
            return SegmentStatus::SizeMismatch { expected, actual }
        }
        Err(other) => return SegmentStatus::Unavailable(other.to_string()),
    };

    let reader = match StateReader::open(mem) {
        Ok(reader) => reader,
        Err(e) => return layout_status(e),
    };
    match reader.read() {
        Ok(snapshot) => SegmentStatus::Readable(snapshot),
        Err(ReadError::WriterStalled(seq)) => SegmentStatus::Stalled { seq },
        Err(ReadError::Layout(e)) => layout_status(e),
    }
}

fn layout_status(error: LayoutError) -> SegmentStatus {
    match error {
        LayoutError::SizeMismatch { expected, actual } => SegmentStatus::SizeMismatch { expected, actual },
        LayoutError::ProtocolMismatch { .. } | LayoutError::RingMismatch { .. } => {
            SegmentStatus::ProtocolMismatch(error)
        }
    }
}
