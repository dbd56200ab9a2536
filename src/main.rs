//! reweave binary entry point.

use std::process::ExitCode;

use reweave::cli::{self, Cli};
use reweave::ui::output;
use tracing_subscriber::EnvFilter;

/// Log to stderr. `RUST_LOG` wins; otherwise `--debug` selects debug level.
fn init_tracing(debug: bool) {
    let default = if debug { "reweave=debug" } else { "reweave=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_tracing(cli.debug);

    match cli::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output::error(format!("{:#}", err));
            ExitCode::FAILURE
        }
    }
}
