//! Credentials file bookkeeping.
//!
//! The first run of the client writes a JSON credentials file holding the
//! login record; every later run reads it and skips password login. The
//! file holds an access token, so its `Debug` output is redacted and it
//! should be kept out of shared directories.
//!
//! # Lookup order
//!
//! A path with directory components is used as-is. A bare filename is
//! looked up in the current directory first and then in the per-user
//! config directory (`<config>/tessera/<name>`), matching where users are
//! encouraged to move their files once they accumulate. Writes always go
//! to the location given on the command line.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the per-user config subdirectory.
const APP_DIR: &str = "tessera";

/// Errors from reading or writing a credentials file.
#[derive(Debug, Error)]
pub enum CredentialsError {
    /// The file could not be read or written.
    #[error("credentials file {path}: {source}")]
    Io {
        /// Path that was being accessed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file exists but does not parse as a credentials record.
    #[error("credentials file {path} is malformed: {source}")]
    Malformed {
        /// Path that was being parsed.
        path: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// The stored login record.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Homeserver URL, e.g. `https://example.org`.
    pub homeserver: String,
    /// Full user id, e.g. `@user:example.org`.
    pub user_id: String,
    /// Device id assigned at login.
    pub device_id: String,
    /// Access token from login.
    pub access_token: String,
    /// Default room messages are sent to.
    pub room_id: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("homeserver", &self.homeserver)
            .field("user_id", &self.user_id)
            .field("device_id", &self.device_id)
            .field("access_token", &format!("<redacted {} bytes>", self.access_token.len()))
            .field("room_id", &self.room_id)
            .finish()
    }
}

impl Credentials {
    /// Resolve where to read a credentials file from.
    ///
    /// Returns the given path when it exists or is not a bare filename;
    /// otherwise falls back to the config-directory copy when that one
    /// exists. When neither exists the given path comes back unchanged, so
    /// the caller's "file missing, run setup" branch sees the primary
    /// location.
    pub fn resolve_path(given: &Path) -> PathBuf {
        if given.exists() || given.parent() != Some(Path::new("")) {
            return given.to_path_buf();
        }
        match dirs::config_dir() {
            Some(config) => {
                let fallback = config.join(APP_DIR).join(given);
                if fallback.exists() { fallback } else { given.to_path_buf() }
            },
            None => given.to_path_buf(),
        }
    }

    /// Read a credentials file.
    pub fn load(path: &Path) -> Result<Self, CredentialsError> {
        let display = path.display().to_string();
        let raw = fs::read_to_string(path)
            .map_err(|source| CredentialsError::Io { path: display.clone(), source })?;
        serde_json::from_str(&raw)
            .map_err(|source| CredentialsError::Malformed { path: display, source })
    }

    /// Write the credentials file, creating parent directories as needed.
    pub fn store(&self, path: &Path) -> Result<(), CredentialsError> {
        let display = path.display().to_string();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|source| CredentialsError::Io { path: display.clone(), source })?;
            }
        }
        let raw = serde_json::to_string_pretty(self).map_err(|source| {
            CredentialsError::Malformed { path: display.clone(), source }
        })?;
        fs::write(path, raw).map_err(|source| CredentialsError::Io { path: display, source })
    }
}
