//! restore command - Undo the last rewrite of a branch

use anyhow::{bail, Context as _, Result};
use serde::Serialize;

use super::Session;
use crate::core::ops::RepoLock;
use crate::core::types::{Oid, RefName};
use crate::engine::{self, Context};
use crate::store::ObjectStore;
use crate::ui::{output, prompts};

/// Arguments of `reweave restore`.
#[derive(Debug, Clone, Default)]
pub struct RestoreArgs {
    pub branch: Option<String>,
    pub force: bool,
    pub dry_run: bool,
    pub json: bool,
    pub yes: bool,
}

#[derive(Debug, Serialize)]
struct RestoreOutput<'a> {
    branch: &'a str,
    from: &'a Oid,
    to: &'a Oid,
    restored: bool,
    dry_run: bool,
}

/// Point the branch back at its pre-rewrite tip.
pub fn restore(ctx: &Context, args: RestoreArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let branch = session.branch(args.branch.as_deref())?;

    if args.dry_run {
        let original = ObjectStore::resolve_ref(&session.git, &RefName::for_original(&branch))?
            .with_context(|| format!("No backup of '{}' to restore from", branch))?;
        let tip = session
            .git
            .resolve_branch_tip(&branch)?
            .with_context(|| format!("Branch '{}' not found", branch))?;
        let rewritten = ObjectStore::resolve_ref(&session.git, &RefName::for_rewritten(&branch))?;
        if !args.force && tip != original && rewritten.as_ref() != Some(&tip) {
            bail!(
                "'{}' moved since it was rewritten; restoring would discard {}. Use --force to restore anyway.",
                branch,
                tip.short(7)
            );
        }

        if args.json {
            output::json(&RestoreOutput {
                branch: branch.as_str(),
                from: &tip,
                to: &original,
                restored: false,
                dry_run: true,
            })?;
        } else {
            output::print(
                format!("Would restore '{}': {} -> {}", branch, tip.short(7), original.short(7)),
                session.verbosity,
            );
        }
        return Ok(());
    }

    let _lock = RepoLock::acquire(&session.paths).context("Failed to lock repository")?;

    if !args.yes && session.interactive {
        let question = format!("Restore '{}' to its tip before the last rewrite?", branch);
        match prompts::confirm(&question, false, true) {
            Ok(true) => {}
            Ok(false) | Err(prompts::PromptError::Cancelled) => {
                output::print("Aborted; nothing was changed.", session.verbosity);
                return Ok(());
            }
            Err(e) => return Err(e).context("Failed to read confirmation"),
        }
    }

    let outcome = engine::restore_branch(&session.git, &branch, args.force)
        .with_context(|| format!("Failed to restore '{}'", branch))?;

    if args.json {
        output::json(&RestoreOutput {
            branch: outcome.branch.as_str(),
            from: &outcome.from,
            to: &outcome.to,
            restored: !outcome.is_noop(),
            dry_run: false,
        })?;
    } else if outcome.is_noop() {
        output::print(
            format!("'{}' already points at {}", outcome.branch, outcome.to.short(7)),
            session.verbosity,
        );
    } else {
        output::print(
            format!(
                "Restored '{}': {} -> {}",
                outcome.branch,
                outcome.from.short(7),
                outcome.to.short(7)
            ),
            session.verbosity,
        );
    }
    Ok(())
}
