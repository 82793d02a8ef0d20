//! Coordination store abstraction and backends.
//!
//! The store is the only cross-process shared state used by the toolkit.
//! Every keyed mutation goes through one of its conditional or atomic
//! primitives:
//!
//! - `set_if_absent` for lock acquisition,
//! - `delete_if_equals` for owner-checked lock release,
//! - `take_token` for the token-bucket refill-and-consume step.

pub mod bucket;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use bucket::{BucketDecision, BucketSpec, BucketState};
pub use common::{Context, ContextError};
pub use error::{Result, StoreError};
pub use memory::InMemoryCoordinationStore;
pub use postgres::PostgresCoordinationStore;
pub use store::{CoordinationStore, CoordinationStoreExt};
