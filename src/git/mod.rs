//! git
//!
//! Single interface for all Git operations.
//!
//! # Architecture
//!
//! This module is the **only doorway** to Git. All repository reads and
//! writes flow through [`Git`]; no other module imports `git2`. The
//! [`store`](crate::store) layer adapts `Git` to the object-store capability
//! trait the rewrite engine consumes.
//!
//! # Responsibilities
//!
//! - Repository discovery and opening
//! - Ref operations (resolve, enumerate, atomic CAS update)
//! - Commit reads and raw commit writes
//! - Shallow boundary and in-progress operation detection
//!
//! # Invariants
//!
//! - All ref updates use CAS (compare-and-swap) semantics
//! - All operations return strong types (Oid, BranchName, RefName, CommitNode)

mod interface;

pub use interface::{Git, GitError, GitState, RepoInfo};
