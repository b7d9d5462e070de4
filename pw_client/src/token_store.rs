//! Access token persistence.
//!
//! Only the token is kept on disk; balance and entitlements are always
//! refetched from the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crate::errors::{ClientError, ClientResult};

/// Environment variable overriding the token file location
pub const TOKEN_FILE_ENV: &str = "PW_CLIENT_TOKEN_FILE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

impl StoredToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$PW_CLIENT_TOKEN_FILE`, else `~/.pw_client/token.json`
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(TOKEN_FILE_ENV) {
            return PathBuf::from(path);
        }
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Path::new(&home).join(".pw_client").join("token.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored token, unless missing or expired
    pub fn load(&self) -> ClientResult<Option<StoredToken>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(storage_error(&self.path, err)),
        };

        let token: StoredToken = serde_json::from_str(&raw)
            .map_err(|e| ClientError::Storage(format!("{}: {}", self.path.display(), e)))?;

        if token.is_expired(Utc::now()) {
            return Ok(None);
        }
        Ok(Some(token))
    }

    pub fn save(&self, token: &StoredToken) -> ClientResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| storage_error(parent, e))?;
        }
        let raw = serde_json::to_string_pretty(token)
            .map_err(|e| ClientError::Storage(e.to_string()))?;
        fs::write(&self.path, raw).map_err(|e| storage_error(&self.path, e))
    }

    /// Forget the token; a missing file is not an error
    pub fn clear(&self) -> ClientResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_error(&self.path, err)),
        }
    }
}

fn storage_error(path: &Path, err: io::Error) -> ClientError {
    ClientError::Storage(format!("{}: {}", path.display(), err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn temp_store() -> TokenStore {
        let dir = std::env::temp_dir().join(format!("pw_client_test_{}", rand::random::<u64>()));
        TokenStore::new(dir.join("token.json"))
    }

    fn token(expires_at: DateTime<Utc>) -> StoredToken {
        StoredToken {
            access_token: "abc.def.ghi".to_string(),
            username: "reader1".to_string(),
            expires_at,
        }
    }

    #[test]
    fn test_save_load_clear() {
        let store = temp_store();
        assert_eq!(store.load().unwrap(), None);

        let saved = token(Utc::now() + Duration::hours(1));
        store.save(&saved).unwrap();
        assert_eq!(store.load().unwrap(), Some(saved));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();
    }

    #[test]
    fn test_expired_token_is_ignored() {
        let store = temp_store();
        store.save(&token(Utc::now() - Duration::minutes(1))).unwrap();
        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();
    }

    #[test]
    fn test_corrupt_file_is_a_storage_error() {
        let store = temp_store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "not json").unwrap();
        assert!(matches!(store.load(), Err(ClientError::Storage(_))));
        store.clear().unwrap();
    }
}
