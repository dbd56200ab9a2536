//! engine
//!
//! Orchestrates a history rewrite: Load -> Draft -> Rehash -> (Preview | Apply).
//!
//! # Architecture
//!
//! The engine works against an [`ObjectStore`](crate::store::ObjectStore),
//! never against a repository directly:
//!
//! 1. **Load** ([`load`]): read the commit DAG reachable from a branch tip
//! 2. **Draft** ([`plan`]): evaluate the rule set, one draft per commit
//! 3. **Rehash** ([`rehash`]): walk parents-first, recompute ids, remap parents
//! 4. **Preview** ([`report`]): summarize what would change, without writing
//! 5. **Apply** ([`apply`]): verify, write new objects, swap the branch tip once
//!
//! # Invariants
//!
//! - Load and validation errors abort before any object is written
//! - The branch compare-and-swap is the only mutation of visible state
//! - New commit objects written before a failed swap stay unreachable
//! - A commit no rule touches, whose parents are unchanged, keeps its id
//! - Verification failure of a planned graph indicates a bug
//!
//! # Example
//!
//! ```
//! use reweave::core::rules::{FieldPatch, Matcher, RewriteRule, RuleSet};
//! use reweave::core::types::BranchName;
//! use reweave::engine::{apply_rewrite, plan_rewrite, preview_rewrite, ApplyOptions, PlanOptions};
//! use reweave::store::MemoryStore;
//!
//! let store = MemoryStore::new();
//! let main = BranchName::new("main").unwrap();
//! let a = store.add_commit(&[], "A\n");
//! let b = store.add_commit(&[a.clone()], "B\n");
//! store.set_branch(&main, &b);
//!
//! let rules = RuleSet::single(RewriteRule::new(
//!     Matcher::Any,
//!     FieldPatch {
//!         author_email: Some("new@example.com".into()),
//!         ..FieldPatch::default()
//!     },
//! ));
//!
//! let plan = plan_rewrite(&store, &main, &rules, &PlanOptions::default()).unwrap();
//! assert_eq!(preview_rewrite(&plan).changed_count(), 2);
//!
//! let outcome = apply_rewrite(&store, &plan, &ApplyOptions::default()).unwrap();
//! assert_eq!(outcome.changed_count, 2);
//! ```

pub mod apply;
pub mod load;
pub mod plan;
pub mod rehash;
pub mod report;
pub mod verify;

pub use apply::{apply_rewrite, restore_branch, ApplyOptions, ApplyOutcome, RestoreOutcome};
pub use load::{list_history, load_history, LoadOptions};
pub use plan::{
    build_drafts, plan_from_graph, plan_rewrite, Draft, PlanEntry, PlanOptions, RewritePlan,
};
pub use rehash::{rehash, rehash_concurrent, Rehashed};
pub use report::{preview_rewrite, DiffEntry, DiffReport};
pub use verify::verify_plan;

use std::path::PathBuf;

use thiserror::Error;

use crate::core::graph::GraphError;
use crate::core::rules::RuleError;
use crate::core::types::{BranchName, Oid};
use crate::store::StoreError;

/// Execution context for commands.
///
/// Contains global settings derived from CLI flags that affect command behavior.
#[derive(Debug, Clone)]
pub struct Context {
    /// Working directory override.
    pub cwd: Option<PathBuf>,
    /// Debug logging enabled.
    pub debug: bool,
    /// Quiet mode (minimal output).
    pub quiet: bool,
    /// Prompt choice from the command line; `None` defers to config.
    pub interactive: Option<bool>,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            cwd: None,
            debug: false,
            quiet: false,
            interactive: None,
        }
    }
}

/// Errors from rewrite operations.
#[derive(Debug, Error)]
pub enum RewriteError {
    /// The branch (or a requested commit) does not exist.
    #[error("{what} not found")]
    NotFound {
        /// What was looked up
        what: String,
    },

    /// The history or a planned graph is structurally broken.
    #[error("history is corrupt: {message}")]
    Corruption {
        /// Description of the problem
        message: String,
    },

    /// A rule was rejected before any rewriting.
    #[error("invalid rewrite: {0}")]
    Validation(#[from] RuleError),

    /// The branch kept moving; retries exhausted.
    #[error("branch {branch} was modified concurrently (now at {})", describe_tip(.current))]
    ConcurrentModification {
        /// The contended branch
        branch: BranchName,
        /// Its tip at the last attempt, `None` if it was deleted
        current: Option<Oid>,
    },

    /// The operation was cancelled; no object was written.
    #[error("rewrite cancelled")]
    Cancelled,

    /// The rehash worker pool could not be started.
    #[error("failed to start rehash workers: {0}")]
    WorkerPool(#[source] std::io::Error),

    /// Object store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RewriteError {
    pub(crate) fn corruption(message: impl Into<String>) -> Self {
        RewriteError::Corruption {
            message: message.into(),
        }
    }
}

impl From<GraphError> for RewriteError {
    fn from(err: GraphError) -> Self {
        RewriteError::corruption(err.to_string())
    }
}

fn describe_tip(tip: &Option<Oid>) -> String {
    match tip {
        Some(oid) => oid.short(7).to_string(),
        None => "<deleted>".to_string(),
    }
}
