//! `sidecar-certs` binary entrypoint.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sidecar_certs::cli::{Cli, Commands};
use sidecar_certs::commands::{IssueCommand, ProfilesCommand, VerifyCommand};
use sidecar_certs::config::ProfileConfig;
use sidecar_certs::output::OutputFormat;

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(cli.verbose))
        .with_writer(io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` when set, otherwise `info` (or `debug` when verbose) for our crates.
fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("sidecar_certs={level},sidecar_pki={level}"))
    })
}

fn run(cli: Cli) -> Result<(), sidecar_certs::CliError> {
    let format = OutputFormat::new(cli.format);
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::Issue(args) => {
            let profiles = ProfileConfig::load(cli.config.as_deref())?;
            let cmd = IssueCommand::new(&cli.root, profiles);
            cmd.execute(&mut stdout, &format, &args)?;
        }
        Commands::Verify(args) => {
            let cmd = VerifyCommand::new(&cli.root);
            cmd.execute(&mut stdout, &format, &args)?;
        }
        Commands::Profiles(args) => {
            let profiles = ProfileConfig::load(cli.config.as_deref())?;
            let cmd = ProfilesCommand::new(profiles);
            cmd.execute(&mut stdout, &format, &args)?;
        }
    }

    Ok(())
}
