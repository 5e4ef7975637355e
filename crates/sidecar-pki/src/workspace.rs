//! On-disk layout of issued artifacts.
//!
//! Every scope owns a directory `{root}/{az}/{CLUSTER}/` holding the CA key
//! and certificate plus the injector's key, request and certificate.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// The (availability zone, cluster) pair that isolates one set of artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Scope {
    az: String,
    cluster: String,
}

impl Scope {
    /// Validates and normalizes a scope: the zone is lower-cased, the cluster
    /// upper-cased.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InputValidation`] if either part is empty or contains
    /// characters other than ASCII letters, digits, `.`, `_` and `-`, or
    /// starts with `.`.
    pub fn new(az: &str, cluster: &str) -> Result<Self> {
        Ok(Self {
            az: normalize_component("availability zone", az)?.to_ascii_lowercase(),
            cluster: normalize_component("cluster", cluster)?.to_ascii_uppercase(),
        })
    }

    /// Normalized availability zone.
    #[must_use]
    pub fn az(&self) -> &str {
        &self.az
    }

    /// Normalized cluster name.
    #[must_use]
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Scope directory relative to the workspace root.
    #[must_use]
    pub fn relative_path(&self) -> PathBuf {
        Path::new(&self.az).join(&self.cluster)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.az, self.cluster)
    }
}

fn normalize_component<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InputValidation(format!("{field} must not be empty")));
    }
    if value.starts_with('.') {
        return Err(Error::InputValidation(format!(
            "{field} '{value}' must not start with '.'"
        )));
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(Error::InputValidation(format!(
            "{field} '{value}' contains invalid character {bad:?}"
        )));
    }
    Ok(value)
}

/// The five files persisted per scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Artifact {
    /// CA private key.
    CaKey,
    /// Self-signed CA certificate.
    CaCert,
    /// Injector private key.
    LeafKey,
    /// Injector signing request.
    LeafCsr,
    /// Injector certificate.
    LeafCert,
}

impl Artifact {
    /// All artifacts in the order the pipeline writes them.
    pub const ALL: [Self; 5] = [
        Self::CaKey,
        Self::CaCert,
        Self::LeafKey,
        Self::LeafCsr,
        Self::LeafCert,
    ];

    /// File name inside the scope directory.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::CaKey => "ca.key",
            Self::CaCert => "ca.crt",
            Self::LeafKey => "sidecar-injector.key",
            Self::LeafCsr => "sidecar-injector.csr",
            Self::LeafCert => "sidecar-injector.crt",
        }
    }

    /// Whether the artifact holds private key material.
    #[must_use]
    pub const fn is_private_key(self) -> bool {
        matches!(self, Self::CaKey | Self::LeafKey)
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Filesystem root under which scope directories live.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    force: bool,
}

impl Workspace {
    /// Workspace rooted at `root`; overwriting is refused.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            force: false,
        }
    }

    /// Allows [`Workspace::write`] to replace existing artifacts.
    #[must_use]
    pub const fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Whether overwriting is allowed.
    #[must_use]
    pub const fn is_forced(&self) -> bool {
        self.force
    }

    /// Workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of `scope`.
    #[must_use]
    pub fn resolve(&self, scope: &Scope) -> PathBuf {
        self.root.join(scope.relative_path())
    }

    /// Path of one artifact of `scope`.
    #[must_use]
    pub fn path(&self, scope: &Scope, artifact: Artifact) -> PathBuf {
        self.resolve(scope).join(artifact.file_name())
    }

    /// Creates the scope directory and its parents; no-op if present.
    pub fn ensure_dir(&self, scope: &Scope) -> Result<PathBuf> {
        let dir = self.resolve(scope);
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        debug!(path = %dir.display(), "scope directory ready");
        Ok(dir)
    }

    /// Whether the artifact file exists.
    #[must_use]
    pub fn exists(&self, scope: &Scope, artifact: Artifact) -> bool {
        self.path(scope, artifact).is_file()
    }

    /// Reads an artifact as text.
    pub fn read(&self, scope: &Scope, artifact: Artifact) -> Result<String> {
        let path = self.path(scope, artifact);
        fs::read_to_string(&path).map_err(|e| Error::io(&path, e))
    }

    /// Writes an artifact.
    ///
    /// Without force mode the file is created exclusively, so an existing
    /// artifact is never truncated. Private keys are created with mode 0600
    /// on Unix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OverwriteRefused`] if the artifact exists and force
    /// mode is off, or [`Error::Io`] on any filesystem failure.
    pub fn write(&self, scope: &Scope, artifact: Artifact, contents: &[u8]) -> Result<PathBuf> {
        let path = self.path(scope, artifact);
        let replacing = self.force && path.exists();

        let mut options = OpenOptions::new();
        options.write(true);
        if self.force {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            if artifact.is_private_key() {
                options.mode(0o600);
            }
        }

        let mut file = options.open(&path).map_err(|e| {
            if e.kind() == ErrorKind::AlreadyExists {
                Error::OverwriteRefused { path: path.clone() }
            } else {
                Error::io(&path, e)
            }
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if replacing && artifact.is_private_key() {
                fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
                    .map_err(|e| Error::io(&path, e))?;
            }
        }

        file.write_all(contents)
            .and_then(|()| file.sync_all())
            .map_err(|e| Error::io(&path, e))?;

        if replacing {
            warn!(path = %path.display(), "replaced existing artifact");
        } else {
            debug!(path = %path.display(), "wrote artifact");
        }
        Ok(path)
    }
}
