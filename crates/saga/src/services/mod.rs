//! External service traits and in-memory implementations for saga steps.

pub mod accounts;

pub use accounts::{AccountError, AccountService, InMemoryAccountService};
