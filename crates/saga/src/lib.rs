//! Saga pattern implementation.
//!
//! A [`Saga`] runs an ordered list of [`Step`]s. Each step pairs an action
//! with a compensating action. If a step fails, or the caller's context is
//! cancelled between steps, every previously completed step is compensated
//! in reverse order:
//!
//! ```text
//! action 0 ──► action 1 ──► action 2 ✗
//!                                    │
//! compensate 0 ◄── compensate 1 ◄────┘
//! ```
//!
//! Compensation failures are collected, never retried, and never stop the
//! remaining compensations. They are reported on [`SagaError`].
//!
//! The [`transfer`] module builds a two-step funds-transfer saga on top of an
//! [`AccountService`].

pub mod coordinator;
pub mod error;
pub mod services;
pub mod state;
pub mod step;
pub mod transfer;

pub use coordinator::Saga;
pub use error::{CompensationFailure, SagaError, StepError};
pub use services::{AccountError, AccountService, InMemoryAccountService};
pub use state::SagaState;
pub use step::Step;
pub use transfer::{TransferRequest, build_transfer_saga};
