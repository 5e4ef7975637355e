//! # sidecar-certs
//!
//! Command-line front end for [`sidecar_pki`].
//!
//! Provides commands for:
//! - Issuing the injector's CA and serving certificate per scope
//! - Verifying a scope's persisted artifacts
//! - Showing the effective profiles for a scope
//!
//! Artifacts live under `{root}/{az}/{CLUSTER}/`:
//!
//! ```text
//! us-east-1/PRODUCTION/
//! ├── ca.key
//! ├── ca.crt
//! ├── sidecar-injector.key
//! ├── sidecar-injector.csr
//! └── sidecar-injector.crt
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, Format, IssueArgs, ScopeArgs};
pub use config::ProfileConfig;
pub use error::CliError;
pub use output::OutputFormat;
