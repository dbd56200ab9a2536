//! engine::apply
//!
//! The single point where a rewrite becomes visible.
//!
//! # Contract
//!
//! [`apply_rewrite`] MUST:
//! 1. Re-read the branch tip; if it moved, re-plan with the same rules
//! 2. Verify the plan against the history it was built from
//! 3. Write every new commit, parents first, checking each assigned id
//! 4. Swap the branch tip with one compare-and-swap
//! 5. On contention, back off and retry up to `max_retries` times, then
//!    fail with [`RewriteError::ConcurrentModification`]
//! 6. After success, record backup refs under `refs/reweave/`
//!
//! # Invariants
//!
//! - The branch either points at the old tip or at the complete new history
//! - Objects written by a failed attempt are unreachable from the branch
//! - Old commits are never deleted
//! - A no-op plan still performs the (trivial) swap, and records no backups

use std::thread;
use std::time::Duration;

use crate::core::types::{BranchName, Oid, RefName};
use crate::store::{CasOutcome, ObjectStore};

use super::plan::{plan_rewrite, PlanOptions, RewritePlan};
use super::verify::verify_plan;
use super::RewriteError;

/// Cap on the backoff exponent (base * 64).
const MAX_BACKOFF_EXPONENT: u32 = 6;

/// Options for [`apply_rewrite`].
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles per retry
    pub backoff: Duration,
    /// Record `refs/reweave/{original,rewritten}/<branch>`
    pub backup_refs: bool,
    /// Options for re-planning after the branch moved
    pub plan: PlanOptions,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(50),
            backup_refs: true,
            plan: PlanOptions::default(),
        }
    }
}

/// Backup refs written after a successful rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRefs {
    /// Points at the tip before the rewrite
    pub original: RefName,
    /// Points at the tip after the rewrite
    pub rewritten: RefName,
}

/// Result of a successful [`apply_rewrite`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// The rewritten branch
    pub branch: BranchName,
    /// Tip before the swap
    pub old_tip: Oid,
    /// Tip after the swap
    pub new_tip: Oid,
    /// Number of commits with a new id
    pub changed_count: usize,
    /// Original ids of those commits, parents first
    pub changed_ids: Vec<Oid>,
    /// Commit objects written by the successful attempt
    pub written: usize,
    /// Attempts made, including the successful one
    pub attempts: u32,
    /// Whether the branch moved and the rewrite was re-planned
    pub replanned: bool,
    /// Backup refs, when recorded
    pub backup: Option<BackupRefs>,
}

/// Apply a plan atomically.
///
/// # Errors
///
/// - [`RewriteError::ConcurrentModification`] once retries are exhausted or
///   the branch was deleted
/// - [`RewriteError::Corruption`] if verification fails or the store assigns
///   an id other than the planned one
/// - Any error from re-planning
///
/// # Example
///
/// ```
/// use reweave::core::rules::RuleSet;
/// use reweave::core::types::BranchName;
/// use reweave::engine::{apply_rewrite, plan_rewrite, ApplyOptions, PlanOptions};
/// use reweave::store::MemoryStore;
///
/// let store = MemoryStore::new();
/// let main = BranchName::new("main").unwrap();
/// let a = store.add_commit(&[], "A\n");
/// store.set_branch(&main, &a);
///
/// let plan = plan_rewrite(&store, &main, &RuleSet::new(), &PlanOptions::default()).unwrap();
/// let outcome = apply_rewrite(&store, &plan, &ApplyOptions::default()).unwrap();
/// assert_eq!(outcome.new_tip, a);
/// assert_eq!(outcome.changed_count, 0);
/// ```
pub fn apply_rewrite<S: ObjectStore + ?Sized>(
    store: &S,
    plan: &RewritePlan,
    options: &ApplyOptions,
) -> Result<ApplyOutcome, RewriteError> {
    let branch_ref = RefName::for_branch(&plan.branch);
    let mut replanned: Option<RewritePlan> = None;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let current = replanned.as_ref().unwrap_or(plan);

        let observed = match store.resolve_branch_tip(&current.branch)? {
            Some(tip) if tip == current.original_tip => {
                verify_plan(current)?;
                let written = write_objects(store, current)?;
                let message = format!(
                    "reweave: rewrite {} commit(s) of {}",
                    current.changed_count(),
                    current.branch
                );
                match store.compare_and_swap_ref(
                    &branch_ref,
                    Some(&current.original_tip),
                    &current.new_tip,
                    &message,
                )? {
                    CasOutcome::Updated => {
                        return Ok(finish(store, current, options, written, attempt, replanned.is_some()));
                    }
                    CasOutcome::Mismatch { current: found } => found,
                }
            }
            other => other,
        };

        let moved_to = match observed {
            Some(tip) if attempt <= options.max_retries => tip,
            observed => {
                return Err(RewriteError::ConcurrentModification {
                    branch: plan.branch.clone(),
                    current: observed,
                })
            }
        };

        let delay = backoff_delay(options.backoff, attempt);
        tracing::warn!(
            branch = %plan.branch,
            attempt,
            observed = %moved_to,
            delay_ms = delay.as_millis() as u64,
            "branch tip contended, retrying"
        );
        thread::sleep(delay);

        if moved_to != current.original_tip {
            let next = plan_rewrite(store, &plan.branch, &current.rules, &options.plan)?;
            replanned = Some(next);
        }
    }
}

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt - 1)`, capped.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
    base.saturating_mul(2u32.pow(exponent))
}

fn write_objects<S: ObjectStore + ?Sized>(store: &S, plan: &RewritePlan) -> Result<usize, RewriteError> {
    let mut written = 0;
    for entry in plan.changed() {
        let id = store.write_commit(&entry.node)?;
        if id != entry.new_id {
            return Err(RewriteError::corruption(format!(
                "store assigned {} to the rewrite of {}, planned {}",
                id, entry.old_id, entry.new_id
            )));
        }
        written += 1;
    }
    Ok(written)
}

fn finish<S: ObjectStore + ?Sized>(
    store: &S,
    plan: &RewritePlan,
    options: &ApplyOptions,
    written: usize,
    attempts: u32,
    replanned: bool,
) -> ApplyOutcome {
    let changed_ids: Vec<Oid> = plan.changed().map(|e| e.old_id.clone()).collect();

    let backup = if options.backup_refs && !plan.is_noop() {
        match record_backups(store, &plan.branch, &plan.original_tip, &plan.new_tip) {
            Ok(refs) => Some(refs),
            Err(err) => {
                tracing::warn!(branch = %plan.branch, error = %err, "failed to record backup refs");
                None
            }
        }
    } else {
        None
    };

    tracing::info!(
        branch = %plan.branch,
        old_tip = %plan.original_tip,
        new_tip = %plan.new_tip,
        changed = changed_ids.len(),
        attempts,
        "rewrite applied"
    );

    ApplyOutcome {
        branch: plan.branch.clone(),
        old_tip: plan.original_tip.clone(),
        new_tip: plan.new_tip.clone(),
        changed_count: changed_ids.len(),
        changed_ids,
        written,
        attempts,
        replanned,
        backup,
    }
}

fn record_backups<S: ObjectStore + ?Sized>(
    store: &S,
    branch: &BranchName,
    old_tip: &Oid,
    new_tip: &Oid,
) -> Result<BackupRefs, RewriteError> {
    let refs = BackupRefs {
        original: RefName::for_original(branch),
        rewritten: RefName::for_rewritten(branch),
    };
    for (name, value) in [(&refs.original, old_tip), (&refs.rewritten, new_tip)] {
        let existing = store.resolve_ref(name)?;
        let message = format!("reweave: backup of {}", branch);
        if let CasOutcome::Mismatch { current } =
            store.compare_and_swap_ref(name, existing.as_ref(), value, &message)?
        {
            return Err(RewriteError::ConcurrentModification {
                branch: branch.clone(),
                current,
            });
        }
    }
    Ok(refs)
}

/// Result of [`restore_branch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    /// The restored branch
    pub branch: BranchName,
    /// Tip before restoring
    pub from: Oid,
    /// Tip after restoring (the pre-rewrite tip)
    pub to: Oid,
}

impl RestoreOutcome {
    /// Whether the branch already pointed at the backup.
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

/// Point `branch` back at its pre-rewrite tip.
///
/// Unless `force` is set, the branch must still be at the rewritten tip that
/// was recorded with the backup.
///
/// # Errors
///
/// - [`RewriteError::NotFound`] if there is no backup or no branch
/// - [`RewriteError::ConcurrentModification`] if the branch moved since the
///   rewrite (without `force`) or during the swap
pub fn restore_branch<S: ObjectStore + ?Sized>(
    store: &S,
    branch: &BranchName,
    force: bool,
) -> Result<RestoreOutcome, RewriteError> {
    let original = store
        .resolve_ref(&RefName::for_original(branch))?
        .ok_or_else(|| RewriteError::NotFound {
            what: format!("backup of branch '{}'", branch),
        })?;
    let tip = store
        .resolve_branch_tip(branch)?
        .ok_or_else(|| RewriteError::NotFound {
            what: format!("branch '{}'", branch),
        })?;

    let outcome = RestoreOutcome {
        branch: branch.clone(),
        from: tip.clone(),
        to: original.clone(),
    };
    if outcome.is_noop() {
        return Ok(outcome);
    }

    if !force {
        let rewritten = store.resolve_ref(&RefName::for_rewritten(branch))?;
        if rewritten.as_ref() != Some(&tip) {
            return Err(RewriteError::ConcurrentModification {
                branch: branch.clone(),
                current: Some(tip),
            });
        }
    }
    if store.read_commit(&original)?.is_none() {
        return Err(RewriteError::corruption(format!(
            "backup of {} points at missing commit {}",
            branch, original
        )));
    }

    let message = format!("reweave: restore {}", branch);
    match store.compare_and_swap_ref(&RefName::for_branch(branch), Some(&tip), &original, &message)? {
        CasOutcome::Updated => {
            tracing::info!(branch = %branch, from = %tip, to = %original, "branch restored");
            Ok(outcome)
        }
        CasOutcome::Mismatch { current } => Err(RewriteError::ConcurrentModification {
            branch: branch.clone(),
            current,
        }),
    }
}
