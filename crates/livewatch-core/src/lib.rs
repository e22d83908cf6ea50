//! livewatch core - shared domain types for live-status tracking
//!
//! This crate provides the types shared between the platform adapters
//! (`livewatch-platforms`) and the daemon (`livewatchd`), plus the pure
//! liveness state machine the daemon's tracker applies.
//!
//! Production code is panic-free: no `.unwrap()`, `.expect()`, `panic!()`
//! or direct indexing outside of tests.

pub mod error;
pub mod platform;
pub mod session;
pub mod snapshot;
pub mod state;
pub mod target;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use platform::Platform;
pub use session::{LiveSession, SessionId, SessionView, TargetStats};
pub use snapshot::{non_empty, StatusSnapshot};
pub use state::{
    should_log_failure, CachedStatus, Liveness, QueryOutcome, SessionChange, SessionCommit,
    TrackedState, Transition, FAILURE_LOG_EVERY,
};
pub use target::{Target, TargetId};
