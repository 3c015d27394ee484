use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use tracing::{debug, warn};

use crate::config::ConfigLocator;

use super::{AuthError, Token};

/// Persistence abstraction for the saved OAuth token.
///
/// The record is only ever replaced wholesale; there are no partial updates.
pub trait TokenStore {
    /// Load the saved token. Fails with [`AuthError::TokenMissing`] when no
    /// token exists and [`AuthError::TokenCorrupt`] when the stored bytes do
    /// not parse; a corrupt file is deleted so the next load reports missing.
    fn load(&self) -> Result<Token, AuthError>;
    fn save(&self, token: &Token) -> Result<(), AuthError>;
    /// Remove the saved token; succeeds silently when none exists.
    fn delete(&self) -> Result<(), AuthError>;
}

/// Filesystem-backed token storage located in the user configuration directory.
pub struct FileTokenStore {
    locator: ConfigLocator,
}

impl FileTokenStore {
    pub fn new(locator: ConfigLocator) -> Self {
        Self { locator }
    }

    pub fn with_default_locator() -> Result<Self, AuthError> {
        Ok(Self::new(ConfigLocator::new()?))
    }

    fn write_file(path: &Path, payload: &str) -> Result<(), AuthError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_all(payload.as_bytes())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perm = file.metadata()?.permissions();
            perm.set_mode(0o600);
            fs::set_permissions(path, perm)?;
        }

        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Token, AuthError> {
        let path = self.locator.token_file();
        if !path.exists() {
            return Err(AuthError::TokenMissing);
        }
        let raw = fs::read_to_string(&path)?;
        match serde_json::from_str(&raw) {
            Ok(token) => {
                debug!(path = %path.display(), "loaded saved token");
                Ok(token)
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "saved token unreadable, deleting it");
                let _ = fs::remove_file(&path);
                Err(AuthError::TokenCorrupt)
            }
        }
    }

    fn save(&self, token: &Token) -> Result<(), AuthError> {
        let path = self.locator.token_file();
        let payload = serde_json::to_string_pretty(token)?;
        Self::write_file(&path, &payload)?;
        debug!(path = %path.display(), "saved token");
        Ok(())
    }

    fn delete(&self) -> Result<(), AuthError> {
        let path = self.locator.token_file();
        match fs::remove_file(path) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> FileTokenStore {
        let locator = ConfigLocator::from_root_for_tests(dir.path().to_path_buf());
        FileTokenStore::new(locator)
    }

    fn sample_token() -> Token {
        Token::new(
            "access".into(),
            Some("refresh".into()),
            Utc::now() + Duration::hours(1),
            vec!["Notes.Read".into()],
        )
    }

    #[test]
    fn round_trip_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        let token = sample_token();
        store.save(&token).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.access_token, token.access_token);
        assert_eq!(loaded.refresh_token, token.refresh_token);
    }

    #[test]
    fn load_missing_token() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        assert!(matches!(store.load(), Err(AuthError::TokenMissing)));
    }

    #[test]
    fn corrupt_token_is_deleted_on_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        let path = temp_dir.path().join("token.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(store.load(), Err(AuthError::TokenCorrupt)));
        assert!(!path.exists());
        assert!(matches!(store.load(), Err(AuthError::TokenMissing)));
    }

    #[test]
    fn delete_missing_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        store.delete().unwrap();
    }

    #[test]
    fn save_overwrites_existing_record() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        store.save(&sample_token()).unwrap();
        let mut replacement = sample_token();
        replacement.access_token = "newer".into();
        store.save(&replacement).unwrap();
        assert_eq!(store.load().unwrap().access_token, "newer");
    }
}
