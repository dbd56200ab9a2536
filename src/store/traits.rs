//! store::traits
//!
//! The object-store capability set consumed by the rewrite engine.
//!
//! # Design
//!
//! The engine never talks to a repository directly. Everything it needs is
//! expressed here: enumerate and read commits, check that a tree exists,
//! write a commit object, and compare-and-swap a ref. Two implementations
//! exist: [`Git`](crate::git::Git) for real repositories and
//! [`MemoryStore`](super::MemoryStore) for deterministic tests.
//!
//! # Invariants
//!
//! - `write_commit` returns the id the store assigned to the written bytes;
//!   callers compare it against the id they computed.
//! - `compare_and_swap_ref` is all-or-nothing. A mismatch is reported as a
//!   value ([`CasOutcome::Mismatch`]), not an error, so callers can retry.

use std::collections::HashSet;

use thiserror::Error;

use crate::core::commit::{CommitNode, HashAlgorithm};
use crate::core::types::{BranchName, Oid, RefName};
use crate::git::GitError;

/// Errors from object store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failure inside the git backend.
    #[error(transparent)]
    Git(#[from] GitError),

    /// I/O failure (also used for injected faults).
    #[error("object store i/o failure: {message}")]
    Io {
        /// Description of the failure
        message: String,
    },
}

/// Result of a compare-and-swap ref update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The ref now holds the new value.
    Updated,
    /// The ref did not hold the expected value and was left untouched.
    Mismatch {
        /// Value found, `None` if the ref does not exist
        current: Option<Oid>,
    },
}

/// Capability set of a content-addressed commit store.
pub trait ObjectStore {
    /// Hash function the store uses for object ids.
    fn hash_algorithm(&self) -> HashAlgorithm;

    /// Resolve a ref to a commit id. `None` if it does not exist.
    fn resolve_ref(&self, name: &RefName) -> Result<Option<Oid>, StoreError>;

    /// Resolve `refs/heads/<branch>`.
    fn resolve_branch_tip(&self, branch: &BranchName) -> Result<Option<Oid>, StoreError> {
        self.resolve_ref(&RefName::for_branch(branch))
    }

    /// Read a commit. `None` if it does not exist.
    fn read_commit(&self, id: &Oid) -> Result<Option<CommitNode>, StoreError>;

    /// Whether a tree object with this id exists.
    fn contains_tree(&self, id: &Oid) -> Result<bool, StoreError>;

    /// Write a commit object from its encoding and return the assigned id.
    fn write_commit(&self, commit: &CommitNode) -> Result<Oid, StoreError>;

    /// Set `name` to `new` if it currently holds `expected`
    /// (`None` = must not exist).
    fn compare_and_swap_ref(
        &self,
        name: &RefName,
        expected: Option<&Oid>,
        new: &Oid,
        message: &str,
    ) -> Result<CasOutcome, StoreError>;

    /// Commits whose parents are known to be absent (shallow clone roots).
    fn shallow_boundary(&self) -> Result<HashSet<Oid>, StoreError>;
}
