//! rewrite command - Apply a TOML rule file

use std::path::Path;

use anyhow::{Context as _, Result};

use super::{run_rewrite, Session};
use crate::cli::args::RewriteArgs;
use crate::core::rules::RuleSet;
use crate::engine::Context;

/// Rewrite history with the rules in `path`.
///
/// The file is parsed and validated before the repository is opened.
pub fn rewrite(ctx: &Context, path: &Path, args: &RewriteArgs) -> Result<()> {
    let rules = RuleSet::load(path).context("Failed to load rules")?;
    tracing::debug!(path = %path.display(), rules = rules.len(), "loaded rule file");

    let session = Session::open(ctx)?;
    run_rewrite(&session, rules, args)
}
