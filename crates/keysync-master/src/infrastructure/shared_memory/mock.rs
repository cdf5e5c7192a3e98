//! Segment provider that fails on demand, for retry tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use keysync_core::protocol::HeapSegment;

use super::{HeapSegmentProvider, SegmentError, SegmentProvider};

/// Shared attempt counter of a [`FlakyProvider`].
#[derive(Debug, Clone, Default)]
pub struct AttemptCounter(Arc<AtomicU32>);

impl AttemptCounter {
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Fails the first `failures` creates, then hands out a heap segment.
pub struct FlakyProvider {
    failures: u32,
    attempts: AttemptCounter,
    inner: HeapSegmentProvider,
}

impl FlakyProvider {
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            attempts: AttemptCounter::default(),
            inner: HeapSegmentProvider::new(),
        }
    }

    pub fn attempts(&self) -> AttemptCounter {
        self.attempts.clone()
    }

    /// The segment handed out once creation succeeds.
    pub fn segment(&self) -> Arc<HeapSegment> {
        self.inner.segment()
    }
}

impl SegmentProvider for FlakyProvider {
    type Memory = Arc<HeapSegment>;

    fn create(&mut self) -> Result<Self::Memory, SegmentError> {
        let attempt = self.attempts.0.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(SegmentError::Os {
                name: "mock".to_string(),
                reason: format!("refused attempt {attempt}"),
            });
        }
        self.inner.create()
    }
}
