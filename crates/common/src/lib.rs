//! Shared building blocks for the resilience toolkit.
//!
//! - [`Context`]: cancellation and deadline carrier threaded through every
//!   operation that may wait on an external system.
//! - [`Clock`]: wall-clock abstraction so time-dependent components can be
//!   driven deterministically in tests.

pub mod clock;
pub mod context;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use context::{Context, ContextError};
