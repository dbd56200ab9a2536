//! engine::verify
//!
//! Structural verification of a planned rewrite.
//!
//! # Invariants Checked
//!
//! Against the graph the plan was built from:
//! 1. Every loaded commit has exactly one entry, and the tip is mapped
//! 2. Tree ids are unchanged
//! 3. Parent counts are unchanged and each parent is the rewritten id of the
//!    original parent, in the original order
//! 4. Untouched commits are byte-identical to the original, and a rewritten
//!    boundary commit differs from the original only in its parent ids
//! 5. Every rewritten id is the hash of the rewritten contents
//! 6. Entries are parents-first, so the new graph is acyclic
//! 7. No two commits collapse into the same new id
//! 8. Every rewritten commit is reachable from the new tip
//!
//! # Invariants
//!
//! - Verify is read-only and deterministic
//! - If verify fails on a plan the engine produced, this indicates a bug

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;

use crate::core::commit::{CommitField, CommitNode};
use crate::core::types::Oid;

use super::plan::{PlanEntry, RewritePlan};
use super::RewriteError;

/// Errors from plan verification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    /// A loaded commit has no entry.
    #[error("commit {commit} is missing from the plan")]
    Unmapped {
        /// The commit
        commit: Oid,
    },

    /// The branch tip does not map to the planned new tip.
    #[error("tip {tip} does not map to the planned new tip")]
    TipNotMapped {
        /// The original tip
        tip: Oid,
    },

    /// A rewrite changed the snapshot.
    #[error("tree of commit {commit} changed")]
    TreeChanged {
        /// The commit
        commit: Oid,
    },

    /// A rewrite added or dropped parents.
    #[error("commit {commit} had {before} parents, now has {after}")]
    ParentCountChanged {
        /// The commit
        commit: Oid,
        /// Original parent count
        before: usize,
        /// Planned parent count
        after: usize,
    },

    /// A parent does not resolve to its planned or preserved id.
    #[error("parent {index} of commit {commit} is not the rewritten original parent")]
    ParentMismatch {
        /// The commit
        commit: Oid,
        /// Position in the parent list
        index: usize,
    },

    /// A commit that must be kept verbatim was altered.
    #[error("commit {commit} must be kept verbatim")]
    NotPreserved {
        /// The commit
        commit: Oid,
    },

    /// A planned id does not hash the planned contents.
    #[error("commit {commit} planned as {planned}, contents hash to {actual}")]
    IdMismatch {
        /// The original commit
        commit: Oid,
        /// Id in the plan
        planned: Oid,
        /// Hash of the contents
        actual: Oid,
    },

    /// An entry precedes one of its parents.
    #[error("commit {commit} is ordered before its parent {parent}")]
    OutOfOrder {
        /// The commit
        commit: Oid,
        /// The parent
        parent: Oid,
    },

    /// A rewritten commit would not be part of the rewritten branch.
    #[error("rewritten commit {commit} is not reachable from the new tip")]
    Unreachable {
        /// The original commit
        commit: Oid,
    },

    /// Two commits became identical.
    #[error("commits {first} and {second} would both become {new_id}")]
    Collision {
        /// First original commit
        first: Oid,
        /// Second original commit
        second: Oid,
        /// The shared new id
        new_id: Oid,
    },
}

impl From<VerifyError> for RewriteError {
    fn from(err: VerifyError) -> Self {
        RewriteError::corruption(err.to_string())
    }
}

/// Verify a plan against the history it was built from.
pub fn verify_plan(plan: &RewritePlan) -> Result<(), RewriteError> {
    check(plan).map_err(RewriteError::from)
}

fn check(plan: &RewritePlan) -> Result<(), VerifyError> {
    let graph = plan.graph();

    let mut ids: Vec<&Oid> = graph.ids().collect();
    ids.sort();
    for id in ids {
        if !plan.contains(id) {
            return Err(VerifyError::Unmapped { commit: id.clone() });
        }
    }
    if plan.new_id(&plan.original_tip) != Some(&plan.new_tip) {
        return Err(VerifyError::TipNotMapped {
            tip: plan.original_tip.clone(),
        });
    }

    let mut placed: HashSet<&Oid> = HashSet::with_capacity(plan.entries.len());
    let mut claimed: HashMap<&Oid, &Oid> = HashMap::with_capacity(plan.entries.len());

    for entry in &plan.entries {
        let commit = &entry.old_id;
        let original = graph
            .get(commit)
            .ok_or_else(|| VerifyError::Unmapped { commit: commit.clone() })?;
        let node = &entry.node;

        if node.id != entry.new_id {
            return Err(VerifyError::IdMismatch {
                commit: commit.clone(),
                planned: entry.new_id.clone(),
                actual: node.id.clone(),
            });
        }
        if node.tree != original.tree {
            return Err(VerifyError::TreeChanged { commit: commit.clone() });
        }
        if node.parents.len() != original.parents.len() {
            return Err(VerifyError::ParentCountChanged {
                commit: commit.clone(),
                before: original.parents.len(),
                after: node.parents.len(),
            });
        }

        if !entry.is_changed() {
            if node != original {
                return Err(VerifyError::NotPreserved { commit: commit.clone() });
            }
        } else {
            if graph.is_boundary(commit) && !only_parents_moved(original, node) {
                return Err(VerifyError::NotPreserved { commit: commit.clone() });
            }
            let actual = node.compute_id(plan.algorithm);
            if actual != entry.new_id {
                return Err(VerifyError::IdMismatch {
                    commit: commit.clone(),
                    planned: entry.new_id.clone(),
                    actual,
                });
            }
        }

        for parent in graph.graph_parents(commit) {
            if !placed.contains(parent) {
                return Err(VerifyError::OutOfOrder {
                    commit: commit.clone(),
                    parent: parent.clone(),
                });
            }
        }
        for (index, (old, new)) in original.parents.iter().zip(&node.parents).enumerate() {
            if plan.new_id(old).unwrap_or(old) != new {
                return Err(VerifyError::ParentMismatch {
                    commit: commit.clone(),
                    index,
                });
            }
        }

        if let Some(first) = claimed.insert(&entry.new_id, commit) {
            return Err(VerifyError::Collision {
                first: first.clone(),
                second: commit.clone(),
                new_id: entry.new_id.clone(),
            });
        }
        placed.insert(commit);
    }

    if plan.entries.len() != graph.len() {
        return Err(VerifyError::Unmapped {
            commit: plan.original_tip.clone(),
        });
    }
    check_reachable(plan)
}

fn only_parents_moved(original: &CommitNode, node: &CommitNode) -> bool {
    let mut headers = original.raw.clone();
    headers.strip_signatures();
    original
        .changed_fields(node)
        .iter()
        .all(|field| *field == CommitField::Parents)
        && node.raw == headers
}

fn check_reachable(plan: &RewritePlan) -> Result<(), VerifyError> {
    let by_new_id: HashMap<&Oid, &PlanEntry> =
        plan.entries.iter().map(|e| (&e.new_id, e)).collect();

    let mut seen: HashSet<&Oid> = HashSet::new();
    let mut queue: VecDeque<&Oid> = VecDeque::from([&plan.new_tip]);
    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        if let Some(entry) = by_new_id.get(id) {
            queue.extend(entry.node.parents.iter());
        }
    }

    match plan
        .entries
        .iter()
        .find(|e| e.is_changed() && !seen.contains(&e.new_id))
    {
        Some(entry) => Err(VerifyError::Unreachable {
            commit: entry.old_id.clone(),
        }),
        None => Ok(()),
    }
}
