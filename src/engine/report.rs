//! engine::report
//!
//! Dry-run reporting.
//!
//! [`preview_rewrite`] turns a plan into a [`DiffReport`] without touching
//! any store. The report lists exactly the commits that
//! [`apply_rewrite`](super::apply_rewrite) would give new ids, in the same
//! order, so a dry run and a real run agree on what changes.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::core::commit::CommitField;
use crate::core::types::{BranchName, Oid};

use super::plan::RewritePlan;

/// Length of abbreviated ids in text output.
const SHORT_ID: usize = 7;

/// One changed commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    /// Id before the rewrite
    pub old_id: Oid,
    /// Id after the rewrite
    pub new_id: Oid,
    /// First line of the rewritten message
    pub summary: String,
    /// Fields a rule changed on this commit itself
    pub changed_fields: Vec<CommitField>,
    /// Parents were rewritten
    pub descendant_changed: bool,
    /// Label of the matching rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

/// Summary of a planned rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffReport {
    /// Branch the plan moves
    pub branch: BranchName,
    /// Tip the plan was built from
    pub original_tip: Oid,
    /// Tip after the rewrite
    pub new_tip: Oid,
    /// Digest of the plan, see [`RewritePlan::digest`]
    pub plan_digest: String,
    /// Commits examined
    pub total_commits: usize,
    /// Commits that get a new id, parents first
    pub entries: Vec<DiffEntry>,
    /// Boundary commits a rule matched but that stay as they are
    pub skipped_boundary: Vec<Oid>,
}

impl DiffReport {
    /// Original ids of changed commits, parents first.
    pub fn changed_ids(&self) -> Vec<Oid> {
        self.entries.iter().map(|e| e.old_id.clone()).collect()
    }

    /// Number of commits that get a new id.
    pub fn changed_count(&self) -> usize {
        self.entries.len()
    }

    /// Commits changed by a rule, as opposed to only through their parents.
    pub fn direct_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| !e.changed_fields.is_empty())
            .count()
    }

    /// Whether applying would change nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Human-readable rendering.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        if self.is_empty() {
            let _ = writeln!(
                out,
                "No changes to {} ({} commits examined)",
                self.branch, self.total_commits
            );
        } else {
            let _ = writeln!(
                out,
                "Rewrite of {}: {} of {} commits change ({} directly)",
                self.branch,
                self.changed_count(),
                self.total_commits,
                self.direct_count()
            );
            for entry in &self.entries {
                let _ = write!(
                    out,
                    "  {} -> {}  {}",
                    entry.old_id.short(SHORT_ID),
                    entry.new_id.short(SHORT_ID),
                    entry.summary
                );
                if !entry.changed_fields.is_empty() {
                    let fields: Vec<&str> = entry.changed_fields.iter().map(|f| f.as_str()).collect();
                    let _ = write!(out, "  [{}]", fields.join(", "));
                }
                if let Some(rule) = &entry.rule {
                    let _ = write!(out, " (rule {})", rule);
                }
                if entry.descendant_changed && entry.changed_fields.is_empty() {
                    let _ = write!(out, " (parents rewritten)");
                }
                out.push('\n');
            }
            let _ = writeln!(
                out,
                "Tip: {} -> {}",
                self.original_tip.short(SHORT_ID),
                self.new_tip.short(SHORT_ID)
            );
        }

        if !self.skipped_boundary.is_empty() {
            let ids: Vec<&str> = self.skipped_boundary.iter().map(|id| id.short(SHORT_ID)).collect();
            let _ = writeln!(
                out,
                "Skipped {} boundary commit(s) matched by a rule: {}",
                ids.len(),
                ids.join(", ")
            );
        }
        out
    }

    /// Pretty JSON rendering.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Build the dry-run report for a plan. Pure.
pub fn preview_rewrite(plan: &RewritePlan) -> DiffReport {
    let entries = plan
        .changed()
        .map(|entry| DiffEntry {
            old_id: entry.old_id.clone(),
            new_id: entry.new_id.clone(),
            summary: entry.node.summary().to_string(),
            changed_fields: entry.changed_fields.clone(),
            descendant_changed: entry.descendant_changed,
            rule: entry
                .rule
                .and_then(|index| plan.rules.rules.get(index).map(|rule| rule.label(index))),
        })
        .collect();

    DiffReport {
        branch: plan.branch.clone(),
        original_tip: plan.original_tip.clone(),
        new_tip: plan.new_tip.clone(),
        plan_digest: plan.digest(),
        total_commits: plan.entries.len(),
        entries,
        skipped_boundary: plan.skipped_boundary.clone(),
    }
}
