//! Application layer use cases for the KeySync master.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure rules in `keysync-core`) and the infrastructure (hook, window APIs,
//! shared memory, files).
//!
//! Code in this layer:
//!
//! - **Orchestrates** domain objects: the key state model, the active
//!   [`keysync_core::FilterProfile`], the target matcher.
//! - **Depends on abstractions** (the infrastructure traits) so every use case
//!   runs in tests against the mocks.
//! - **Makes no OS calls of its own**.
//!
//! # Sub-modules
//!
//! - **`foreground`** – Foreground ownership with the grace window that keeps
//!   a briefly unfocused master from pausing synchronization.
//! - **`sync_engine`** – The state machine: admits key events, handles the
//!   pause hotkey, reconciles against the OS on every heartbeat, and publishes
//!   snapshots and key events to the shared segment.
//! - **`control_loop`** – The Tokio task that owns the engine and feeds it hook
//!   events, timer ticks, window scans and commands.
//! - **`status`** – The read-only view of the engine broadcast to observers.

pub mod control_loop;
pub mod foreground;
pub mod status;
pub mod sync_engine;
