//! config command - Get, set, or list configuration values

use anyhow::{bail, Context as _, Result};

use super::{working_dir, Session};
use crate::core::config::{Config, GlobalConfig, KEYS};
use crate::core::types::BranchName;
use crate::engine::Context;
use crate::git::Git;
use crate::ui::output::{self, Verbosity};

/// Load config for the repository at the working directory, or only the
/// global config outside a repository.
fn load(ctx: &Context) -> Result<(Config, Option<Session>)> {
    let cwd = working_dir(ctx)?;
    if Git::open(&cwd).is_ok() {
        let session = Session::open(ctx)?;
        Ok((session.config.clone(), Some(session)))
    } else {
        let loaded = Config::load(None).context("Failed to load config")?;
        Ok((loaded.config, None))
    }
}

/// Get a configuration value.
pub fn get(ctx: &Context, key: &str) -> Result<()> {
    let (config, _) = load(ctx)?;
    let value = config.get(key)?;
    println!("{}", value);
    Ok(())
}

/// Set a configuration value.
///
/// Writes the repository config unless `global` is set. `interactive` is a
/// user preference and `branch` is per repository.
pub fn set(ctx: &Context, key: &str, value: &str, global: bool) -> Result<()> {
    if !KEYS.contains(&key) {
        bail!("Unknown configuration key '{}'. Known keys: {}", key, KEYS.join(", "));
    }
    let verbosity = Verbosity::from_flags(ctx.quiet, ctx.debug);
    let (config, session) = load(ctx)?;

    let path = match (global, key) {
        (true, "branch") => bail!("'branch' is a repository setting; drop --global"),
        (false, "interactive") => bail!("'interactive' is a user setting; use --global"),
        (true, _) => {
            let mut global_config: GlobalConfig = config.global.clone();
            global_config.set(key, value)?;
            Config::write_global(&global_config).context("Failed to write config")?
        }
        (false, _) => {
            let session = session.context("Not inside a git repository; use --global")?;
            if key == "branch" {
                BranchName::new(value).context("Invalid branch name")?;
            }
            let mut repo_config = config.repo.clone().unwrap_or_default();
            repo_config.set(key, value)?;
            Config::write_repo(&session.paths, &repo_config).context("Failed to write config")?
        }
    };

    output::print(format!("Set {} = {} ({})", key, value, path.display()), verbosity);
    Ok(())
}

/// List all configuration values.
pub fn list(ctx: &Context) -> Result<()> {
    let (config, _) = load(ctx)?;

    match config.global_config_loaded_from() {
        Some(path) => println!("# global: {}", path.display()),
        None => println!("# global: (none)"),
    }
    match config.repo_config_loaded_from() {
        Some(path) => println!("# repo: {}", path.display()),
        None => println!("# repo: (none)"),
    }
    for key in KEYS {
        println!("{} = {}", key, config.get(key)?);
    }
    Ok(())
}
