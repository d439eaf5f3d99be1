//! Filesystem-backed session storage.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use fieldsync_core::error::{Error, StorageError};
use fieldsync_core::types::{TicketId, UserProfile};
use fieldsync_core::{AccessToken, CredentialPair, RefreshToken, Result, TokenStore};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

fn map_io(err: std::io::Error) -> Error {
    Error::Storage(StorageError::from(err))
}

/// The four keys the store manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreKey {
    Token,
    RefreshToken,
    User,
    ActiveTicketId,
}

impl StoreKey {
    const ALL: [StoreKey; 4] = [
        StoreKey::Token,
        StoreKey::RefreshToken,
        StoreKey::User,
        StoreKey::ActiveTicketId,
    ];

    fn name(self) -> &'static str {
        match self {
            StoreKey::Token => "token",
            StoreKey::RefreshToken => "refreshToken",
            StoreKey::User => "user",
            StoreKey::ActiveTicketId => "activeTicketId",
        }
    }

    fn is_secure(self) -> bool {
        matches!(self, StoreKey::Token | StoreKey::RefreshToken)
    }
}

/// Filesystem-backed session storage.
///
/// Layout under the root directory:
///
/// ```text
/// secure/token            owner-only (0600)
/// secure/refreshToken     owner-only (0600)
/// general/user            JSON profile
/// general/activeTicketId
/// store.lock
/// ```
///
/// Every operation holds an advisory lock on `store.lock` (shared for reads,
/// exclusive for writes), so a reader in another process never observes a
/// half-written pair or a half-cleared store. Individual files are replaced
/// by write-then-rename.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a new file store at the given root directory.
    ///
    /// The directory is created lazily on first write.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Get the root directory path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn secure_dir(&self) -> PathBuf {
        self.root.join("secure")
    }

    fn general_dir(&self) -> PathBuf {
        self.root.join("general")
    }

    fn lock_path(&self) -> PathBuf {
        self.root.join("store.lock")
    }

    fn key_path(&self, key: StoreKey) -> PathBuf {
        let dir = if key.is_secure() {
            self.secure_dir()
        } else {
            self.general_dir()
        };
        dir.join(key.name())
    }

    /// Run `f` while holding the store lock.
    fn with_lock<T>(&self, exclusive: bool, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        fs::create_dir_all(&self.root).map_err(map_io)?;

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())
            .map_err(map_io)?;

        if exclusive {
            lock_file.lock_exclusive().map_err(map_io)?;
        } else {
            lock_file.lock_shared().map_err(map_io)?;
        }

        let result = f(self);

        lock_file.unlock().map_err(map_io)?;

        result
    }

    fn read_key(&self, key: StoreKey) -> Result<Option<String>> {
        match fs::read_to_string(self.key_path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(map_io(e)),
        }
    }

    fn write_key(&self, key: StoreKey, value: &str) -> Result<()> {
        let path = self.key_path(key);
        let parent = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent).map_err(map_io)?;

        let tmp_path = parent.join(format!(".{}.{}.tmp", key.name(), Uuid::new_v4().simple()));

        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&tmp_path)
            .map_err(map_io)?;

        // Restrict before any secret bytes land in the file.
        #[cfg(unix)]
        if key.is_secure() {
            file.set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(map_io)?;
        }

        file.write_all(value.as_bytes()).map_err(map_io)?;
        file.sync_data().map_err(map_io)?;
        drop(file);

        fs::rename(&tmp_path, &path).map_err(map_io)?;
        Ok(())
    }

    fn remove_key(&self, key: StoreKey) -> Result<()> {
        match fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(map_io(e)),
        }
    }

    /// Run a blocking store operation off the async runtime.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&FileStore) -> Result<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| {
                Error::Storage(StorageError::Io {
                    message: format!("storage task failed: {}", e),
                })
            })?
    }
}

#[async_trait]
impl TokenStore for FileStore {
    #[instrument(skip(self, pair), fields(root = %self.root.display()))]
    async fn save(&self, pair: &CredentialPair) -> Result<()> {
        let access = pair.access_token.as_str().to_string();
        let refresh = pair.refresh_token.as_str().to_string();

        self.blocking(move |store| {
            store.with_lock(true, |store| {
                let previous = store.read_key(StoreKey::Token)?;
                store.write_key(StoreKey::Token, &access)?;

                if let Err(err) = store.write_key(StoreKey::RefreshToken, &refresh) {
                    // Put the old access token back so the pair stays matched.
                    let restored = match &previous {
                        Some(token) => store.write_key(StoreKey::Token, token),
                        None => store.remove_key(StoreKey::Token),
                    };
                    if let Err(restore_err) = restored {
                        warn!(error = %restore_err, "Failed to restore previous access token");
                    }
                    return Err(err);
                }
                Ok(())
            })
        })
        .await?;

        debug!("Saved credential pair");
        Ok(())
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn load(&self) -> Result<Option<CredentialPair>> {
        let (access, refresh) = self
            .blocking(|store| {
                store.with_lock(false, |store| {
                    Ok((
                        store.read_key(StoreKey::Token)?,
                        store.read_key(StoreKey::RefreshToken)?,
                    ))
                })
            })
            .await?;

        match (access, refresh) {
            (Some(access), Some(refresh)) => Ok(Some(CredentialPair::new(
                AccessToken::new(access),
                RefreshToken::new(refresh),
            ))),
            (None, None) => Ok(None),
            _ => {
                warn!("Found only one half of the credential pair, treating as logged out");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn clear(&self) -> Result<()> {
        self.blocking(|store| {
            store.with_lock(true, |store| {
                for key in StoreKey::ALL {
                    store.remove_key(key)?;
                }
                Ok(())
            })
        })
        .await?;

        debug!("Cleared session storage");
        Ok(())
    }

    #[instrument(skip(self, expected), fields(root = %self.root.display()))]
    async fn clear_if_refresh_token(&self, expected: &RefreshToken) -> Result<bool> {
        let expected = expected.as_str().to_string();
        let cleared = self
            .blocking(move |store| {
                store.with_lock(true, |store| {
                    if store.read_key(StoreKey::RefreshToken)?.as_deref() != Some(expected.as_str())
                    {
                        return Ok(false);
                    }
                    for key in StoreKey::ALL {
                        store.remove_key(key)?;
                    }
                    Ok(true)
                })
            })
            .await?;

        if cleared {
            debug!("Cleared session storage");
        } else {
            debug!("Stored refresh token changed, keeping session storage");
        }
        Ok(cleared)
    }

    #[instrument(skip(self, profile), fields(root = %self.root.display()))]
    async fn save_profile(&self, profile: &UserProfile) -> Result<()> {
        let json = serde_json::to_string(profile).map_err(|e| {
            Error::Storage(StorageError::Corrupt {
                key: StoreKey::User.name().to_string(),
                message: e.to_string(),
            })
        })?;

        self.blocking(move |store| {
            store.with_lock(true, |store| store.write_key(StoreKey::User, &json))
        })
        .await
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn load_profile(&self) -> Result<Option<UserProfile>> {
        let json = self
            .blocking(|store| store.with_lock(false, |store| store.read_key(StoreKey::User)))
            .await?;

        json.map(|json| {
            serde_json::from_str(&json).map_err(|e| {
                Error::Storage(StorageError::Corrupt {
                    key: StoreKey::User.name().to_string(),
                    message: e.to_string(),
                })
            })
        })
        .transpose()
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn save_active_ticket(&self, ticket: &TicketId) -> Result<()> {
        let ticket = ticket.as_str().to_string();
        self.blocking(move |store| {
            store.with_lock(true, |store| {
                store.write_key(StoreKey::ActiveTicketId, &ticket)
            })
        })
        .await
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn load_active_ticket(&self) -> Result<Option<TicketId>> {
        let raw = self
            .blocking(|store| {
                store.with_lock(false, |store| store.read_key(StoreKey::ActiveTicketId))
            })
            .await?;

        raw.map(|raw| {
            TicketId::new(raw).map_err(|e| {
                Error::Storage(StorageError::Corrupt {
                    key: StoreKey::ActiveTicketId.name().to_string(),
                    message: e.to_string(),
                })
            })
        })
        .transpose()
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn remove_active_ticket(&self) -> Result<()> {
        self.blocking(|store| {
            store.with_lock(true, |store| store.remove_key(StoreKey::ActiveTicketId))
        })
        .await
    }
}
