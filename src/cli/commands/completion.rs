//! completion command - Generate shell completion scripts

use std::io::Write;

use anyhow::Result;
use clap::CommandFactory;
use clap_complete::{generate, shells};

use crate::cli::args::{Cli, Shell};

/// Write the completion script for `shell` to `out`.
fn write_completion(shell: Shell, out: &mut dyn Write) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();

    match shell {
        Shell::Bash => generate(shells::Bash, &mut cmd, &name, out),
        Shell::Zsh => generate(shells::Zsh, &mut cmd, &name, out),
        Shell::Fish => generate(shells::Fish, &mut cmd, &name, out),
        Shell::PowerShell => generate(shells::PowerShell, &mut cmd, &name, out),
    }
}

/// Print the completion script for `shell` on stdout.
pub fn completion(shell: Shell) -> Result<()> {
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    write_completion(shell, &mut lock);
    lock.flush()?;
    Ok(())
}
