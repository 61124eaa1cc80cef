// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber; `RUST_LOG` wins over the flags
fn init_logging(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn log_level(verbose: bool, quiet: bool, suppress_warnings: bool) -> &'static str {
    if verbose {
        "debug"
    } else if suppress_warnings {
        "error"
    } else if quiet {
        "warn"
    } else {
        "info"
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan(args) => {
            let config = commands::load_scan_config(&args)?;
            init_logging(log_level(
                cli.verbose || config.verbose,
                cli.quiet,
                config.suppress_warnings,
            ));
            commands::cmd_scan(&args, config)
        }
        Commands::ListMethods => {
            init_logging(log_level(cli.verbose, cli.quiet, false));
            commands::cmd_list_methods()
        }
        Commands::CheckKeywords {
            path,
            ignore_evidence_types,
        } => {
            init_logging(log_level(cli.verbose, cli.quiet, false));
            commands::cmd_check_keywords(&path, &ignore_evidence_types)
        }
    }
}
