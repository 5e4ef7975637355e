//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Issue and verify TLS material for the sidecar injector webhook.
#[derive(Parser, Debug, Clone)]
#[command(name = "sidecar-certs")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the per-scope artifact trees.
    #[arg(short, long, default_value = ".")]
    pub root: PathBuf,

    /// TOML file with CA and leaf profiles. Built-in defaults are used when absent.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(short, long)]
    pub verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Bootstrap the scope's CA if needed and issue the injector certificate.
    Issue(IssueArgs),

    /// Check that a scope's artifacts form a valid CA and leaf pair.
    Verify(ScopeArgs),

    /// Print the effective CA and leaf profiles for a scope.
    Profiles(ScopeArgs),
}

/// Availability zone and cluster selecting a scope.
#[derive(Args, Debug, Clone)]
pub struct ScopeArgs {
    /// Deployment / availability zone, e.g. `us-east-1` or `dc01`.
    #[arg(long, env = "DEPLOYMENT")]
    pub az: String,

    /// Cluster name, e.g. `PRODUCTION`.
    #[arg(long, env = "CLUSTER")]
    pub cluster: String,
}

/// Arguments for `issue`.
#[derive(Args, Debug, Clone)]
pub struct IssueArgs {
    /// Scope to issue for.
    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Replace existing leaf artifacts instead of refusing.
    #[arg(long)]
    pub force: bool,

    /// Throw away the scope's CA and bootstrap a new one.
    #[arg(long, requires = "force")]
    pub regenerate_ca: bool,
}
