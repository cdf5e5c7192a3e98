//! Infrastructure layer for the master process.
//!
//! Contains OS-facing adapters: the global keyboard hook, key state queries,
//! window enumeration, the named shared-memory segment, the uptime clock and
//! file-system storage.
//!
//! **Dependency rule**: this layer may depend on `keysync_core`, which never
//! imports it back. The application layer uses it only through the traits
//! defined here (`KeyEventSource`, `KeyStateProbe`, `WindowEnumerator`,
//! `SegmentProvider`), so tests can run the engine against mocks.

pub mod clock;
pub mod key_source;
pub mod os_keyboard;
pub mod shared_memory;
pub mod storage;
pub mod windows_enum;
