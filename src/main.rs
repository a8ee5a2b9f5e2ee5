use std::process::ExitCode;

use clap::Parser;

use ddx_harness::cli::Cli;

fn main() -> ExitCode {
    // A missing .env is fine; keys may come from the real environment.
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    ddx_harness::init_tracing();

    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "Loaded .env");
    }

    match ddx_harness::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "ddx-harness failed");
            ExitCode::FAILURE
        }
    }
}
