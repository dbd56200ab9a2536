//! ui::prompts
//!
//! Interactive confirmations.
//!
//! # Design
//!
//! Prompts are only shown in interactive mode. Non-interactive callers
//! skip the question entirely, so scripts never block on stdin.

use std::io::{self, BufRead, Write};

use thiserror::Error;

/// Errors from prompts.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt cancelled by user")]
    Cancelled,

    #[error("not in interactive mode")]
    NotInteractive,

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<io::Error> for PromptError {
    fn from(err: io::Error) -> Self {
        PromptError::IoError(err.to_string())
    }
}

/// Prompt for confirmation (yes/no) on the terminal.
///
/// Returns `Ok(true)` if the user confirms, `Ok(false)` if they decline.
/// Returns `Err(PromptError::NotInteractive)` if not in interactive mode.
pub fn confirm(message: &str, default: bool, interactive: bool) -> Result<bool, PromptError> {
    if !interactive {
        return Err(PromptError::NotInteractive);
    }
    let stdin = io::stdin();
    let mut stderr = io::stderr();
    confirm_with(&mut stdin.lock(), &mut stderr, message, default)
}

/// [`confirm`] over explicit streams.
///
/// An empty answer takes the default; end of input cancels.
pub fn confirm_with(
    input: &mut impl BufRead,
    output: &mut impl Write,
    message: &str,
    default: bool,
) -> Result<bool, PromptError> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    loop {
        write!(output, "{} {} ", message, hint)?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(PromptError::Cancelled);
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "" => return Ok(default),
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => writeln!(output, "Please answer y or n.")?,
        }
    }
}
