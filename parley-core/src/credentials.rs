//! Credential sources for connecting a session
//!
//! A [`CredentialSource`] is consulted on every `connect`. A missing token is
//! not an error: some deployments accept anonymous connections, and the
//! remote peer is the one that decides.
//!
//! # Example
//!
//! ```no_run
//! use parley_core::credentials::{AccessToken, FileCredentialStore};
//!
//! let store = FileCredentialStore::default_location().with_env_fallback();
//! store.set_access_token(&AccessToken::new("eyJhbGci..."))?;
//! # Ok::<(), parley_core::CredentialError>(())
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CredentialError;

/// Fixed key the session token is persisted under
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Environment variable consulted when the store has no token
pub const ACCESS_TOKEN_ENV: &str = "PARLEY_ACCESS_TOKEN";

/// An opaque bearer token that stays out of logs.
///
/// `Debug` prints `AccessToken([REDACTED])`; the value is only reachable
/// through [`expose_secret`](AccessToken::expose_secret).
#[derive(Clone)]
pub struct AccessToken(SecretString);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Use only when handing the token to the transport.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccessToken([REDACTED])")
    }
}

impl PartialEq for AccessToken {
    fn eq(&self, other: &Self) -> bool {
        self.expose_secret() == other.expose_secret()
    }
}

impl From<&str> for AccessToken {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AccessToken {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Supplies the access token at connect time
pub trait CredentialSource: Send + Sync {
    fn access_token(&self) -> Result<Option<AccessToken>, CredentialError>;
}

/// A fixed token (or none), for embedding and tests
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(Option<AccessToken>);

impl StaticCredentials {
    pub fn new(token: impl Into<AccessToken>) -> Self {
        Self(Some(token.into()))
    }

    /// Connect without any token
    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl CredentialSource for StaticCredentials {
    fn access_token(&self) -> Result<Option<AccessToken>, CredentialError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(default)]
    tokens: BTreeMap<String, String>,
}

/// Tokens persisted in a TOML file, keyed by name
///
/// ```toml
/// [tokens]
/// access_token = "..."
/// ```
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
    env_fallback: bool,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            env_fallback: false,
        }
    }

    /// Store at `$XDG_DATA_HOME/parley/credentials.toml`
    pub fn default_location() -> Self {
        Self::new(parley_paths::credentials_file())
    }

    /// Fall back to `PARLEY_ACCESS_TOKEN` when no token is stored.
    #[must_use]
    pub fn with_env_fallback(mut self) -> Self {
        self.env_fallback = true;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Result<Option<AccessToken>, CredentialError> {
        let file = self.read()?;
        Ok(file.tokens.get(key).map(|t| AccessToken::new(t.as_str())))
    }

    pub fn set(&self, key: &str, token: &AccessToken) -> Result<(), CredentialError> {
        let mut file = self.read()?;
        file.tokens
            .insert(key.to_string(), token.expose_secret().to_string());
        self.write(&file)?;
        debug!(key, path = %self.path.display(), "Stored token");
        Ok(())
    }

    /// Remove a token. Returns whether one was stored.
    pub fn remove(&self, key: &str) -> Result<bool, CredentialError> {
        let mut file = self.read()?;
        let removed = file.tokens.remove(key).is_some();
        if removed {
            self.write(&file)?;
            debug!(key, path = %self.path.display(), "Removed token");
        }
        Ok(removed)
    }

    pub fn set_access_token(&self, token: &AccessToken) -> Result<(), CredentialError> {
        self.set(ACCESS_TOKEN_KEY, token)
    }

    pub fn remove_access_token(&self) -> Result<bool, CredentialError> {
        self.remove(ACCESS_TOKEN_KEY)
    }

    fn read(&self) -> Result<CredentialFile, CredentialError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CredentialFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, file: &CredentialFile) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, toml::to_string(file)?)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

impl CredentialSource for FileCredentialStore {
    fn access_token(&self) -> Result<Option<AccessToken>, CredentialError> {
        if let Some(token) = self.get(ACCESS_TOKEN_KEY)? {
            return Ok(Some(token));
        }
        if self.env_fallback
            && let Ok(value) = std::env::var(ACCESS_TOKEN_ENV)
            && !value.trim().is_empty()
        {
            debug!("Using access token from {}", ACCESS_TOKEN_ENV);
            return Ok(Some(AccessToken::new(value.trim())));
        }
        Ok(None)
    }
}
