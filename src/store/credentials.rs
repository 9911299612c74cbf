//! OAuth credential storage, one JSON file per account.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored OAuth credential for one remote account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub account_id: String,
    pub account_email: String,
    pub access_token: String,
    pub refresh_token: Option<String>,

    #[serde(default)]
    pub authorized_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(
        account_id: String,
        account_email: String,
        access_token: String,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            account_id,
            account_email,
            access_token,
            refresh_token,
            authorized_at: None,
            updated_at: None,
        }
    }
}

/// Filesystem-backed credential store
pub struct CredentialStore {
    tokens_dir: PathBuf,
}

impl CredentialStore {
    /// Open the store, creating the directory with restrictive
    /// permissions where the platform supports them.
    pub fn open(tokens_dir: impl Into<PathBuf>) -> Result<Self> {
        let tokens_dir = tokens_dir.into();
        std::fs::create_dir_all(&tokens_dir)
            .with_context(|| format!("Failed to create tokens directory: {}", tokens_dir.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) =
                std::fs::set_permissions(&tokens_dir, std::fs::Permissions::from_mode(0o700))
            {
                tracing::warn!(error = %e, "Could not restrict tokens directory permissions");
            }
        }

        Ok(Self { tokens_dir })
    }

    fn token_path(&self, account_id: &str) -> PathBuf {
        let safe_id = account_id.replace([':', '/'], "_");
        self.tokens_dir.join(format!("{}.json", safe_id))
    }

    /// Save or update a credential. Timestamps are maintained here:
    /// `updated_at` always, `authorized_at` on first save.
    pub fn save(&self, credential: &Credential) -> Result<()> {
        let mut credential = credential.clone();
        let now = Utc::now();
        credential.updated_at = Some(now);
        if credential.authorized_at.is_none() {
            credential.authorized_at = Some(now);
        }

        let path = self.token_path(&credential.account_id);
        let content = serde_json::to_string_pretty(&credential)?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write credential: {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
            {
                tracing::warn!(error = %e, "Could not restrict credential file permissions");
            }
        }

        tracing::info!(account_id = %credential.account_id, "Saved credential");
        Ok(())
    }

    /// Load the credential for an account, if one exists
    pub fn load(&self, account_id: &str) -> Result<Option<Credential>> {
        let path = self.token_path(account_id);

        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read credential: {}", path.display()))?;

        let credential = serde_json::from_str(&content)
            .with_context(|| format!("Corrupt credential file: {}", path.display()))?;

        Ok(Some(credential))
    }

    /// Remove a stored credential. Returns true if one existed.
    pub fn delete(&self, account_id: &str) -> Result<bool> {
        let path = self.token_path(account_id);

        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to delete credential: {}", path.display()))?;
            tracing::info!(%account_id, "Deleted credential");
            return Ok(true);
        }

        Ok(false)
    }

    /// All authorized account ids. Unreadable files are skipped with a
    /// warning rather than failing the listing.
    pub fn list_account_ids(&self) -> Result<Vec<String>> {
        let mut accounts = Vec::new();

        for entry in std::fs::read_dir(&self.tokens_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            match self.read_account_id(&path) {
                Ok(account_id) => accounts.push(account_id),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable credential file");
                }
            }
        }

        accounts.sort();
        Ok(accounts)
    }

    fn read_account_id(&self, path: &Path) -> Result<String> {
        let content = std::fs::read_to_string(path)?;
        let credential: Credential = serde_json::from_str(&content)?;
        Ok(credential.account_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn credential(id: &str) -> Credential {
        Credential::new(
            id.to_string(),
            format!("{}@example.com", id),
            "access".to_string(),
            Some("refresh".to_string()),
        )
    }

    #[test]
    fn test_save_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = CredentialStore::open(temp.path()).unwrap();

        store.save(&credential("acct-1")).unwrap();

        let loaded = store.load("acct-1").unwrap().unwrap();
        assert_eq!(loaded.account_email, "acct-1@example.com");
        assert!(loaded.authorized_at.is_some());
        assert!(loaded.updated_at.is_some());
    }

    #[test]
    fn test_load_missing_returns_none() {
        let temp = TempDir::new().unwrap();
        let store = CredentialStore::open(temp.path()).unwrap();
        assert!(store.load("nobody").unwrap().is_none());
    }

    #[test]
    fn test_account_id_sanitized_for_filename() {
        let temp = TempDir::new().unwrap();
        let store = CredentialStore::open(temp.path()).unwrap();

        store.save(&credential("dbid:AAH4f99T0taONIb")).unwrap();

        let loaded = store.load("dbid:AAH4f99T0taONIb").unwrap().unwrap();
        assert_eq!(loaded.account_id, "dbid:AAH4f99T0taONIb");
    }

    #[test]
    fn test_list_accounts() {
        let temp = TempDir::new().unwrap();
        let store = CredentialStore::open(temp.path()).unwrap();

        store.save(&credential("b-acct")).unwrap();
        store.save(&credential("a-acct")).unwrap();
        std::fs::write(temp.path().join("junk.json"), "not json").unwrap();

        let accounts = store.list_account_ids().unwrap();
        assert_eq!(accounts, vec!["a-acct", "b-acct"]);
    }

    #[test]
    fn test_delete() {
        let temp = TempDir::new().unwrap();
        let store = CredentialStore::open(temp.path()).unwrap();

        store.save(&credential("acct")).unwrap();
        assert!(store.delete("acct").unwrap());
        assert!(!store.delete("acct").unwrap());
        assert!(store.load("acct").unwrap().is_none());
    }
}
