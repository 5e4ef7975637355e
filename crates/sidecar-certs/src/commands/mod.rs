//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`issue`] - CA bootstrap and leaf issuance for a scope
//! - [`verify`] - Offline check of a scope's artifacts
//! - [`profiles`] - Effective profiles for a scope

pub mod issue;
pub mod profiles;
pub mod verify;

pub use issue::IssueCommand;
pub use profiles::ProfilesCommand;
pub use verify::VerifyCommand;
