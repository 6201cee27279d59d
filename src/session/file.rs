//! File-backed session store
//!
//! Mirrors a [`MemorySessionStore`] to a YAML file so a session survives
//! between CLI invocations. The file is written with 0600 permissions.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tokio::sync::broadcast;

use super::{MemorySessionStore, SessionEvent, SessionStore, StoredSession, TokenPair, UserProfile};
use crate::error::{ConfigError, Result};

/// Session store persisted to disk
pub struct FileSessionStore {
    path: PathBuf,
    inner: MemorySessionStore,
}

impl FileSessionStore {
    /// Open the session file at `path`. A missing file is an empty session.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let inner = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            let session: StoredSession =
                serde_yaml::from_str(&contents).map_err(ConfigError::from)?;
            MemorySessionStore::with_session(session)
        } else {
            MemorySessionStore::new()
        };

        Ok(Self { path, inner })
    }

    /// Location of the session file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, session: &StoredSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents =
            serde_yaml::to_string(session).map_err(|e| ConfigError::SaveError(e.to_string()))?;
        self.write_private(contents.as_bytes())
    }

    /// Write `contents` so the file is never readable by others, even briefly.
    /// A file left over with wider permissions is narrowed before it is truncated.
    fn write_private(&self, contents: &[u8]) -> Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(false);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        file.set_len(0)?;
        file.write_all(contents)?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Option<StoredSession> {
        self.inner.load()
    }

    fn set(&self, tokens: TokenPair, user: Option<UserProfile>) -> Result<()> {
        let session = StoredSession::merged(self.inner.load().as_ref(), tokens, user);
        self.persist(&session)?;
        self.inner.replace(session);
        Ok(())
    }

    fn clear(&self) -> Result<bool> {
        // In-memory state goes first so a failed delete still signs out
        let removed = self.inner.clear()?;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(removed),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(removed),
            Err(err) => Err(err.into()),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.subscribe()
    }
}
