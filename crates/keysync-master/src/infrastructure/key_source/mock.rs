//! Mock key source for tests.
//!
//! Lets tests inject synthetic [`KeyEvent`]s without a running Windows
//! message loop or OS hook.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::{CaptureError, KeyEvent, KeyEventSource};

/// A [`KeyEventSource`] driven by the test.
///
/// Clones share the same channel, so a test can keep one handle for
/// injection while the engine owns the other.
#[derive(Clone, Default)]
pub struct MockKeySource {
    sender: Arc<Mutex<Option<UnboundedSender<KeyEvent>>>>,
    fail_install: bool,
}

impl MockKeySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source whose `start` fails, as when hook installation is refused.
    pub fn failing() -> Self {
        Self {
            fail_install: true,
            ..Self::default()
        }
    }

    /// Injects an event as if captured from hardware. Returns `false` when the
    /// source is not started or the receiver is gone.
    pub fn inject(&self, event: KeyEvent) -> bool {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().is_some_and(|tx| tx.send(event).is_ok())
    }

    pub fn is_started(&self) -> bool {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }
}

impl KeyEventSource for MockKeySource {
    fn start(&mut self) -> Result<UnboundedReceiver<KeyEvent>, CaptureError> {
        if self.fail_install {
            return Err(CaptureError::HookInstallFailed("mock install refused".to_string()));
        }
        let mut guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_some() {
            return Err(CaptureError::AlreadyStarted);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *guard = Some(tx);
        Ok(rx)
    }

    fn stop(&mut self) {
        // Dropping the sender closes the channel.
        *self.sender.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_key_source_starts_and_receives_events() {
        // Arrange
        let mut source = MockKeySource::new();
        let mut rx = source.start().expect("start should succeed");

        // Act
        let sent = source.inject(KeyEvent::down(0x41));

        // Assert
        assert!(sent);
        let event = rx.try_recv().expect("should receive event");
        assert_eq!(event, KeyEvent::down(0x41));
    }

    #[test]
    fn test_mock_key_source_stop_closes_channel_and_is_idempotent() {
        // Arrange
        let mut source = MockKeySource::new();
        let mut rx = source.start().expect("start should succeed");

        // Act
        source.stop();
        source.stop();

        // Assert
        assert!(rx.try_recv().is_err(), "channel should be closed after stop()");
        assert!(!source.inject(KeyEvent::up(0x41)));
    }

    #[test]
    fn test_mock_key_source_rejects_second_start() {
        let mut source = MockKeySource::new();
        let _rx = source.start().expect("start should succeed");

        assert!(matches!(source.start(), Err(CaptureError::AlreadyStarted)));
    }

    #[test]
    fn test_failing_mock_reports_install_failure() {
        let mut source = MockKeySource::failing();
        assert!(matches!(source.start(), Err(CaptureError::HookInstallFailed(_))));
    }
}
