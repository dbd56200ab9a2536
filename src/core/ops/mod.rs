//! core::ops
//!
//! Repository-level operation guards.
//!
//! Every mutating command acquires the exclusive [`RepoLock`] before loading
//! history and holds it until the branch ref has been swapped (or the
//! operation aborted).

pub mod lock;

pub use lock::{LockError, RepoLock};
