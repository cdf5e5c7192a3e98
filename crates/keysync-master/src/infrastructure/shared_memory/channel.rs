//! Publishing side of the shared state: owns the segment writer and retries
//! segment creation without ever failing the caller.

use keysync_core::protocol::SnapshotFrame;
use keysync_core::{LayoutError, StateWriter};
use tracing::{debug, error, info};

use super::{SegmentError, SegmentProvider};

/// Minimum time between two segment creation attempts.
pub const RETRY_INTERVAL_MS: i64 = 1000;

/// A [`StateWriter`] that may not exist yet.
pub struct SharedStateChannel<P: SegmentProvider> {
    provider: P,
    writer: Option<StateWriter<P::Memory>>,
    last_attempt_ms: Option<i64>,
    failures: u32,
}

impl<P: SegmentProvider> SharedStateChannel<P> {
    /// Creates a closed channel. Nothing is mapped until [`Self::ensure_open`].
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            writer: None,
            last_attempt_ms: None,
            failures: 0,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.writer.is_some()
    }

    /// Opens the segment if it is closed and the previous attempt is at least
    /// [`RETRY_INTERVAL_MS`] old. Returns whether the channel is ready.
    pub fn ensure_open(&mut self, now_ms: i64) -> bool {
        if self.writer.is_some() {
            return true;
        }
        if let Some(last) = self.last_attempt_ms {
            if now_ms.saturating_sub(last) < RETRY_INTERVAL_MS {
                return false;
            }
        }
        self.last_attempt_ms = Some(now_ms);

        let opened = self
            .provider
            .create()
            .and_then(|mem| StateWriter::new(mem).map_err(layout_to_segment_error));
        match opened {
            Ok(writer) => {
                if self.failures > 0 {
                    info!(attempts = self.failures + 1, "shared memory segment recovered");
                } else {
                    info!("shared memory segment ready");
                }
                self.failures = 0;
                self.writer = Some(writer);
                true
            }
            Err(e) => {
                // Log once per failure streak; retries stay at debug level.
                if self.failures == 0 {
                    error!(error = %e, "shared memory unavailable, publication suspended");
                } else {
                    debug!(error = %e, attempt = self.failures + 1, "shared memory retry failed");
                }
                self.failures += 1;
                false
            }
        }
    }

    /// Publishes `frame` if the channel is ready. Returns the new sequence.
    pub fn publish(&mut self, frame: &SnapshotFrame) -> Option<u32> {
        self.writer.as_mut().map(|writer| writer.publish(frame))
    }

    /// Appends a key transition if the channel is ready. Returns its sequence id.
    pub fn push_event(&mut self, vk: u8, is_down: bool, timestamp_ms: u64) -> Option<u64> {
        self.writer
            .as_mut()
            .map(|writer| writer.push_event(vk, is_down, timestamp_ms))
    }

    /// Number of snapshots published through the current writer.
    pub fn publish_count(&self) -> u64 {
        self.writer.as_ref().map_or(0, StateWriter::publish_count)
    }

    /// Current sequence, or `0` while closed.
    pub fn sequence(&self) -> u32 {
        self.writer.as_ref().map_or(0, StateWriter::sequence)
    }
}

fn layout_to_segment_error(error: LayoutError) -> SegmentError {
    match error {
        LayoutError::SizeMismatch { expected, actual } => SegmentError::SizeMismatch { expected, actual },
        other => SegmentError::Os {
            name: String::new(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::shared_memory::mock::FlakyProvider;
    use crate::infrastructure::shared_memory::HeapSegmentProvider;

    #[test]
    fn test_channel_opens_on_first_attempt_and_publishes() {
        // Arrange
        let mut channel = SharedStateChannel::new(HeapSegmentProvider::new());

        // Act
        let ready = channel.ensure_open(0);
        let seq = channel.publish(&SnapshotFrame::zeroed());

        // Assert
        assert!(ready);
        assert_eq!(seq, Some(2));
        assert_eq!(channel.publish_count(), 1);
    }

    #[test]
    fn test_closed_channel_skips_publication() {
        let mut channel = SharedStateChannel::new(FlakyProvider::new(u32::MAX));

        assert!(!channel.ensure_open(0));
        assert_eq!(channel.publish(&SnapshotFrame::zeroed()), None);
        assert_eq!(channel.push_event(0x41, true, 0), None);
    }

    #[test]
    fn test_failed_create_is_retried_at_most_once_per_second() {
        // Arrange
        let provider = FlakyProvider::new(2);
        let attempts = provider.attempts();
        let mut channel = SharedStateChannel::new(provider);

        // Act / Assert
        assert!(!channel.ensure_open(0));
        assert!(!channel.ensure_open(500), "too soon, no attempt");
        assert_eq!(attempts.get(), 1);

        assert!(!channel.ensure_open(1000));
        assert_eq!(attempts.get(), 2);

        assert!(channel.ensure_open(2000));
        assert_eq!(attempts.get(), 3);

        assert!(channel.ensure_open(2001));
        assert_eq!(attempts.get(), 3, "an open channel never re-creates");
    }
}
