//! log command - List the commits of a branch

use anyhow::{Context as _, Result};
use serde::Serialize;

use super::Session;
use crate::core::commit::CommitNode;
use crate::core::types::Oid;
use crate::engine::{self, Context};
use crate::ui::output;

/// One commit in `--json` output.
#[derive(Debug, Serialize)]
struct LogEntry<'a> {
    id: &'a Oid,
    parents: &'a [Oid],
    author_name: &'a str,
    author_email: &'a str,
    author_date: String,
    committer_name: &'a str,
    committer_email: &'a str,
    committer_date: String,
    message: &'a str,
}

impl<'a> From<&'a CommitNode> for LogEntry<'a> {
    fn from(commit: &'a CommitNode) -> Self {
        Self {
            id: &commit.id,
            parents: &commit.parents,
            author_name: &commit.author.name,
            author_email: &commit.author.email,
            author_date: commit.author.when.to_rfc3339(),
            committer_name: &commit.committer.name,
            committer_email: &commit.committer.email,
            committer_date: commit.committer.when.to_rfc3339(),
            message: &commit.message,
        }
    }
}

/// List commits newest first.
pub fn log(ctx: &Context, branch: Option<&str>, limit: Option<usize>, json: bool) -> Result<()> {
    let session = Session::open(ctx)?;
    let branch = session.branch(branch)?;

    let commits = engine::list_history(&session.git, &branch, limit)
        .with_context(|| format!("Failed to read history of '{}'", branch))?;

    if json {
        let entries: Vec<LogEntry<'_>> = commits.iter().map(LogEntry::from).collect();
        output::json(&entries)?;
        return Ok(());
    }

    for commit in &commits {
        output::print(output::format_commit(commit), session.verbosity);
    }
    Ok(())
}
