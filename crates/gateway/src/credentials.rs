//! Bearer-token resolution against the account file.
//!
//! Accounts are created and managed elsewhere; the gateway only needs to map
//! a presented token to a user id. The file is re-read whenever its mtime
//! changes and tokens are kept as SHA-256 digests, compared in constant time.

use std::path::PathBuf;
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use hl_domain::UserId;

/// The user a request acts on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthIdentity {
    pub id: UserId,
    pub email: String,
}

#[async_trait::async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify_token(&self, token: &str) -> Option<AuthIdentity>;

    /// Whether at least one account exists. Drives first-run setup.
    async fn user_exists_any(&self) -> bool;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// File-backed adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
struct AccountFile {
    #[serde(default)]
    users: Vec<AccountEntry>,
}

#[derive(Deserialize)]
struct AccountEntry {
    id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    token: String,
}

struct Account {
    identity: AuthIdentity,
    token_hash: [u8; 32],
}

struct Snapshot {
    modified: Option<SystemTime>,
    accounts: Vec<Account>,
}

pub struct FileCredentials {
    path: PathBuf,
    cache: Mutex<Option<Snapshot>>,
}

impl FileCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    /// Run `f` over the current accounts, reloading the file first if it
    /// changed on disk.
    async fn with_accounts<T>(&self, f: impl FnOnce(&[Account]) -> T) -> T {
        let modified = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.modified().ok(),
            Err(_) => return f(&[]),
        };

        let fresh = {
            let cache = self.cache.lock();
            matches!(&*cache, Some(s) if s.modified.is_some() && s.modified == modified)
        };
        if !fresh {
            let accounts = self.load().await;
            *self.cache.lock() = Some(Snapshot { modified, accounts });
        }

        let cache = self.cache.lock();
        match &*cache {
            Some(s) => f(&s.accounts),
            None => f(&[]),
        }
    }

    async fn load(&self) -> Vec<Account> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "reading account file");
                return Vec::new();
            }
        };
        let file: AccountFile = match serde_json::from_str(&raw) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "parsing account file");
                return Vec::new();
            }
        };

        let accounts: Vec<Account> = file
            .users
            .into_iter()
            .filter_map(|u| {
                let id = match UserId::parse(&u.id) {
                    Ok(id) => id,
                    Err(_) => {
                        tracing::warn!(id = %u.id, "skipping account with unusable id");
                        return None;
                    }
                };
                if u.token.is_empty() {
                    return None;
                }
                Some(Account {
                    identity: AuthIdentity { id, email: u.email },
                    token_hash: Sha256::digest(u.token.as_bytes()).into(),
                })
            })
            .collect();
        tracing::debug!(accounts = accounts.len(), "account file loaded");
        accounts
    }
}

#[async_trait::async_trait]
impl CredentialVerifier for FileCredentials {
    async fn verify_token(&self, token: &str) -> Option<AuthIdentity> {
        if token.is_empty() {
            return None;
        }
        let presented = Sha256::digest(token.as_bytes());
        self.with_accounts(|accounts| {
            accounts
                .iter()
                .find(|a| bool::from(a.token_hash.ct_eq(presented.as_slice())))
                .map(|a| a.identity.clone())
        })
        .await
    }

    async fn user_exists_any(&self) -> bool {
        self.with_accounts(|accounts| !accounts.is_empty()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_accounts(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("auth.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn resolves_known_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_accounts(
            &dir,
            r#"{"users":[{"id":"u-1","email":"a@example.com","token":"tok-a","passwordHash":"x"}]}"#,
        );
        let creds = FileCredentials::new(path);

        let who = creds.verify_token("tok-a").await.unwrap();
        assert_eq!(who.id.as_str(), "u-1");
        assert_eq!(who.email, "a@example.com");
        assert!(creds.verify_token("tok-b").await.is_none());
        assert!(creds.verify_token("").await.is_none());
        assert!(creds.user_exists_any().await);
    }

    #[tokio::test]
    async fn missing_file_means_no_users() {
        let dir = tempfile::tempdir().unwrap();
        let creds = FileCredentials::new(dir.path().join("absent.json"));
        assert!(!creds.user_exists_any().await);
        assert!(creds.verify_token("anything").await.is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let creds = FileCredentials::new(write_accounts(&dir, "{not json"));
        assert!(!creds.user_exists_any().await);
    }

    #[tokio::test]
    async fn picks_up_rewritten_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_accounts(&dir, r#"{"users":[]}"#);
        let creds = FileCredentials::new(path.clone());
        assert!(!creds.user_exists_any().await);

        std::fs::write(&path, r#"{"users":[{"id":"u-2","email":"b@example.com","token":"tok"}]}"#)
            .unwrap();
        // Force a distinct mtime on filesystems with coarse timestamps.
        let later = SystemTime::now() + std::time::Duration::from_secs(5);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(later)
            .unwrap();

        assert_eq!(creds.verify_token("tok").await.unwrap().id.as_str(), "u-2");
    }
}
