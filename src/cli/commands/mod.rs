//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Validates command-specific arguments and builds a [`RuleSet`]
//! 2. Calls the engine to plan, preview and apply the rewrite
//! 3. Formats and displays output
//!
//! Handlers do NOT move refs themselves. All history changes flow through
//! [`engine::apply_rewrite`] and [`engine::restore_branch`].

mod bulk;
mod completion;
mod config_cmd;
mod edit;
mod log_cmd;
mod restore;
mod rewrite;

pub use bulk::{author, committer, dates};
pub use completion::completion;
pub use config_cmd::{get as config_get, list as config_list, set as config_set};
pub use edit::edit;
pub use log_cmd::log;
pub use restore::restore;
pub use rewrite::rewrite;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::cli::args::{Command, ConfigAction, RewriteArgs};
use crate::core::config::Config;
use crate::core::ops::RepoLock;
use crate::core::paths::ReweavePaths;
use crate::core::rules::RuleSet;
use crate::core::types::{BranchName, Oid};
use crate::engine::{self, ApplyOptions, Context, DiffReport, LoadOptions, PlanOptions};
use crate::git::Git;
use crate::ui::output::{self, Verbosity};
use crate::ui::prompts;

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Log {
            branch,
            limit,
            json,
        } => log_cmd::log(ctx, branch.as_deref(), limit, json),
        Command::Edit {
            commit,
            author_name,
            author_email,
            committer_name,
            committer_email,
            date,
            author_date,
            committer_date,
            message,
            rewrite,
        } => edit::edit(
            ctx,
            &commit,
            edit::EditFields {
                author_name,
                author_email,
                committer_name,
                committer_email,
                date,
                author_date,
                committer_date,
                message,
            },
            &rewrite,
        ),
        Command::Author { identity, rewrite } => bulk::author(ctx, &identity, &rewrite),
        Command::Committer { identity, rewrite } => bulk::committer(ctx, &identity, &rewrite),
        Command::Dates {
            start,
            end,
            apply_to,
            commits,
            rewrite,
        } => bulk::dates(ctx, &start, &end, apply_to.into(), &commits, &rewrite),
        Command::Rewrite { rules, rewrite } => rewrite::rewrite(ctx, &rules, &rewrite),
        Command::Restore {
            branch,
            force,
            dry_run,
            json,
            yes,
        } => restore::restore(
            ctx,
            restore::RestoreArgs {
                branch,
                force,
                dry_run,
                json,
                yes,
            },
        ),
        Command::Config { action } => match action {
            ConfigAction::Get { key } => config_cmd::get(ctx, &key),
            ConfigAction::Set { key, value, global } => config_cmd::set(ctx, &key, &value, global),
            ConfigAction::List => config_cmd::list(ctx),
        },
        Command::Completion { shell } => completion::completion(shell),
    }
}

/// Repository handle plus the configuration that applies to it.
pub(crate) struct Session {
    pub git: Git,
    pub paths: ReweavePaths,
    pub config: Config,
    pub verbosity: Verbosity,
    pub interactive: bool,
}

impl Session {
    /// Open the repository containing the working directory and load config.
    pub fn open(ctx: &Context) -> Result<Self> {
        let cwd = working_dir(ctx)?;
        let git = Git::open(&cwd).context("Failed to open repository")?;
        let paths = ReweavePaths::from_repo_info(&git.info());
        let verbosity = Verbosity::from_flags(ctx.quiet, ctx.debug);

        let loaded = Config::load(Some(&paths)).context("Failed to load config")?;
        for warning in &loaded.warnings {
            output::warn(
                format!("{} ({})", warning.message, warning.path.display()),
                verbosity,
            );
        }

        let interactive = loaded
            .config
            .prompts_enabled(ctx.interactive, std::io::stdin().is_terminal());
        Ok(Self {
            git,
            paths,
            config: loaded.config,
            verbosity,
            interactive,
        })
    }

    /// The branch named on the command line, else the configured one.
    pub fn branch(&self, requested: Option<&str>) -> Result<BranchName> {
        let name = requested.unwrap_or_else(|| self.config.branch());
        BranchName::new(name).with_context(|| format!("Invalid branch name '{}'", name))
    }

    /// Resolve each revision to a full commit id.
    pub fn resolve_commits(&self, revisions: &[String]) -> Result<Vec<Oid>> {
        revisions
            .iter()
            .map(|rev| {
                self.git
                    .resolve_revision(rev)
                    .with_context(|| format!("Unknown commit '{}'", rev))
            })
            .collect()
    }
}

/// Working directory for repository discovery.
pub(crate) fn working_dir(ctx: &Context) -> Result<PathBuf> {
    match &ctx.cwd {
        Some(cwd) => Ok(cwd.clone()),
        None => std::env::current_dir().context("Failed to determine current directory"),
    }
}

/// Machine-readable result of a rewrite command.
///
/// `report` is the preview that was confirmed. When the branch moved and the
/// rewrite was re-planned, `outcome.changed_ids` is authoritative.
#[derive(Debug, Serialize)]
struct RewriteOutput<'a> {
    applied: bool,
    dry_run: bool,
    report: &'a DiffReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<AppliedSummary<'a>>,
}

#[derive(Debug, Serialize)]
struct AppliedSummary<'a> {
    old_tip: &'a Oid,
    new_tip: &'a Oid,
    changed_ids: &'a [Oid],
    attempts: u32,
    replanned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    backup: Option<String>,
}

/// Plan, preview, confirm and apply a rule set on one branch.
///
/// Shared by every history-changing command. The repository lock is held
/// from loading the history until the branch has been swapped.
pub(crate) fn run_rewrite(session: &Session, rules: RuleSet, args: &RewriteArgs) -> Result<()> {
    rules.validate().context("Invalid rewrite")?;
    let branch = session.branch(args.branch.as_deref())?;

    let state = session.git.state();
    if state.is_in_progress() {
        bail!("A {} is in progress. Finish or abort it before rewriting history.", state);
    }

    let _lock = if args.dry_run {
        None
    } else {
        Some(RepoLock::acquire(&session.paths).context("Failed to lock repository")?)
    };

    let plan_options = PlanOptions {
        load: LoadOptions {
            max_commits: args.max_commits,
        },
        workers: args.workers.unwrap_or_else(|| session.config.workers()).max(1),
        cancel: CancellationToken::new(),
    };
    let plan = engine::plan_rewrite(&session.git, &branch, &rules, &plan_options)
        .with_context(|| format!("Failed to plan rewrite of '{}'", branch))?;
    let report = engine::preview_rewrite(&plan);

    if args.dry_run || report.is_empty() {
        if args.json {
            output::json(&RewriteOutput {
                applied: false,
                dry_run: args.dry_run,
                report: &report,
                outcome: None,
            })?;
        } else {
            output::print(report.render_text().trim_end(), session.verbosity);
            if args.dry_run && !report.is_empty() {
                output::print("Dry run: nothing was written.", session.verbosity);
            }
        }
        return Ok(());
    }

    if !args.json {
        output::print(report.render_text().trim_end(), session.verbosity);
    }
    if !args.yes && session.interactive {
        let question = format!(
            "Rewrite {} commit(s) on '{}'?",
            report.changed_count(),
            branch
        );
        match prompts::confirm(&question, false, true) {
            Ok(true) => {}
            Ok(false) | Err(prompts::PromptError::Cancelled) => {
                output::print("Aborted; nothing was changed.", session.verbosity);
                return Ok(());
            }
            Err(e) => return Err(e).context("Failed to read confirmation"),
        }
    }

    let apply_options = ApplyOptions {
        max_retries: args.max_retries.unwrap_or_else(|| session.config.max_retries()),
        backoff: Duration::from_millis(session.config.backoff_ms()),
        backup_refs: !args.no_backup && session.config.backup_refs(),
        plan: plan_options,
    };
    let outcome = engine::apply_rewrite(&session.git, &plan, &apply_options)
        .with_context(|| format!("Failed to rewrite '{}'", branch))?;

    if args.json {
        output::json(&RewriteOutput {
            applied: true,
            dry_run: false,
            report: &report,
            outcome: Some(AppliedSummary {
                old_tip: &outcome.old_tip,
                new_tip: &outcome.new_tip,
                changed_ids: &outcome.changed_ids,
                attempts: outcome.attempts,
                replanned: outcome.replanned,
                backup: outcome.backup.as_ref().map(|refs| refs.original.to_string()),
            }),
        })?;
    } else {
        output::print(
            format!(
                "Rewrote {} commit(s) on '{}': {} -> {}",
                outcome.changed_count,
                outcome.branch,
                outcome.old_tip.short(7),
                outcome.new_tip.short(7)
            ),
            session.verbosity,
        );
        if outcome.replanned {
            output::warn(
                format!(
                    "'{}' moved during the rewrite; the rules were re-applied to its new tip",
                    outcome.branch
                ),
                session.verbosity,
            );
        }
        if let Some(backup) = &outcome.backup {
            output::print(
                format!(
                    "Previous tip saved as {}. Undo with `reweave restore --branch {}`.",
                    backup.original, outcome.branch
                ),
                session.verbosity,
            );
        }
    }
    Ok(())
}
