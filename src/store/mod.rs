//! store
//!
//! Object store abstraction for the rewrite engine.
//!
//! # Modules
//!
//! - [`traits`] - The [`ObjectStore`] capability trait and its error type
//! - [`memory`] - In-memory store with failure injection, for tests
//! - `git_store` - `ObjectStore` for [`Git`](crate::git::Git)

pub mod memory;
pub mod traits;

mod git_store;

pub use memory::{FailOn, MemoryStore, StoreOperation};
pub use traits::{CasOutcome, ObjectStore, StoreError};
