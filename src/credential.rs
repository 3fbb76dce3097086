//! Bearer credential and local persistence for it.
//!
//! The token is obtained at login and attached both to REST calls and to
//! the real-time channel handshake. [`FileCredentialStore`] keeps it across
//! process restarts the way a browser keeps it in local storage.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// A bearer token. `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token.
    pub fn token(&self) -> &str {
        &self.0
    }

    /// Value for an `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&"<redacted>").finish()
    }
}

/// Load, save and forget the persisted credential.
pub trait CredentialStore {
    /// The stored credential, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store exists but cannot be read or parsed.
    fn load(&self) -> Result<Option<Credential>>;

    /// Persist `credential`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn save(&self, credential: &Credential) -> Result<()>;

    /// Remove the stored credential. Clearing an empty store succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be removed.
    fn clear(&self) -> Result<()>;
}

#[derive(Serialize, Deserialize)]
struct StoredAuth {
    token: Credential,
}

/// A [`CredentialStore`] backed by a small JSON file.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Credential>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let stored: StoredAuth = serde_json::from_str(&raw)?;
        Ok(Some(stored.token))
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(&StoredAuth {
            token: credential.clone(),
        })?;
        std::fs::write(&self.path, json)?;
        debug!(path = %self.path.display(), "credential saved");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::error::PlayroomError;

    fn temp_store(name: &str) -> FileCredentialStore {
        let dir = std::env::temp_dir().join(format!(
            "playroom-client-test-{}-{name}",
            std::process::id()
        ));
        FileCredentialStore::new(dir.join("auth.json"))
    }

    #[test]
    fn debug_redacts_token() {
        let c = Credential::new("secret-token");
        let shown = format!("{c:?}");
        assert!(!shown.contains("secret-token"));
        assert_eq!(c.bearer(), "Bearer secret-token");
    }

    #[test]
    fn save_load_clear() {
        let store = temp_store("roundtrip");
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());

        store.save(&Credential::new("tok-1")).unwrap();
        assert_eq!(store.load().unwrap(), Some(Credential::new("tok-1")));

        store.save(&Credential::new("tok-2")).unwrap();
        assert_eq!(store.load().unwrap().unwrap().token(), "tok-2");

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        store.clear().unwrap();
    }

    #[test]
    fn corrupt_store_is_an_error() {
        let store = temp_store("corrupt");
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "not json").unwrap();
        assert!(matches!(store.load(), Err(PlayroomError::Serialization(_))));
        store.clear().unwrap();
    }
}
