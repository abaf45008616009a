//! Credential vault contract and the file-backed default implementation.
//!
//! The scraper only ever asks one question: "give me the (username,
//! password, domain) triple for this identity". Hosts with a real secret
//! store implement [`CredentialVault`] over it; the bundled [`FileVault`]
//! keeps a JSON file under the data directory with owner-only permissions.
//! At-rest encryption is the host's concern, not this crate's.

use crate::error::ScoutError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A login triple for the portal's SSO.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// SSO domain, e.g. "Student".
    pub domain: String,
}

/// Source of login credentials, keyed by caller identity.
pub trait CredentialVault: Send + Sync {
    /// Fails with [`ScoutError::CredentialsNotFound`] when unset.
    fn get_credentials(&self, identity: &str) -> Result<Credentials>;
}

/// JSON-file vault: `{identity: {username, password, domain}}`.
pub struct FileVault {
    path: PathBuf,
}

impl FileVault {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Default location under the data directory.
    pub fn in_data_dir(data_dir: &std::path::Path) -> Self {
        Self::new(data_dir.join("credentials.json"))
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Store (or replace) the credentials for an identity. The file is
    /// written with owner-only permissions on Unix.
    pub fn store(&self, identity: &str, credentials: &Credentials) -> Result<()> {
        let mut all = self.read_all().unwrap_or_default();
        all.insert(identity.to_string(), credentials.clone());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let body = serde_json::to_vec_pretty(&all)?;
        std::fs::write(&self.path, body)
            .with_context(|| format!("failed to write {}", self.path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("failed to chmod {}", self.path.display()))?;
        }
        Ok(())
    }

    /// Remove the vault file entirely.
    pub fn delete(&self) -> Result<bool> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("failed to delete {}", self.path.display()))?;
            return Ok(true);
        }
        Ok(false)
    }

    fn read_all(&self) -> Result<BTreeMap<String, Credentials>> {
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("malformed vault file: {}", self.path.display()))
    }
}

impl CredentialVault for FileVault {
    fn get_credentials(&self, identity: &str) -> Result<Credentials> {
        if !self.path.exists() {
            return Err(ScoutError::CredentialsNotFound(identity.to_string()).into());
        }
        let all = self.read_all()?;
        all.get(identity)
            .cloned()
            .ok_or_else(|| ScoutError::CredentialsNotFound(identity.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials {
            username: "U2012345A".to_string(),
            password: "hunter2".to_string(),
            domain: "Student".to_string(),
        }
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FileVault::new(dir.path().join("credentials.json"));
        assert!(!vault.exists());

        vault.store("me", &creds()).unwrap();
        let got = vault.get_credentials("me").unwrap();
        assert_eq!(got.username, "U2012345A");
        assert_eq!(got.domain, "Student");
    }

    #[test]
    fn test_missing_identity_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FileVault::new(dir.path().join("credentials.json"));

        let err = vault.get_credentials("nobody").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScoutError>(),
            Some(ScoutError::CredentialsNotFound(_))
        ));

        vault.store("someone", &creds()).unwrap();
        let err = vault.get_credentials("nobody").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScoutError>(),
            Some(ScoutError::CredentialsNotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_vault_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let vault = FileVault::new(dir.path().join("credentials.json"));
        vault.store("me", &creds()).unwrap();

        let mode = std::fs::metadata(dir.path().join("credentials.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FileVault::new(dir.path().join("credentials.json"));
        assert!(!vault.delete().unwrap());
        vault.store("me", &creds()).unwrap();
        assert!(vault.delete().unwrap());
        assert!(!vault.exists());
    }
}
