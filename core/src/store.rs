//! Persistent storage for the session token and user id.
//!
//! Two string keys survive process restarts: `sid` and `uid`. The uid is
//! stored as a decimal string; a stored value that no longer parses is
//! treated as absent so the next `ensure_user` issues a fresh identity.
//!
//! `FileStore` replaces its file atomically: the new identity is written to
//! a temporary file next to the target, restricted to the owner on unix and
//! renamed over the old one. A failed or interrupted save leaves the previous
//! identity readable.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store file {path} is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Both stored values, read as one snapshot.
    async fn load_identity(&self) -> Result<(Option<String>, Option<u32>), StoreError>;
    async fn save_identity(&self, sid: &str, uid: u32) -> Result<(), StoreError>;

    async fn load_sid(&self) -> Result<Option<String>, StoreError> {
        Ok(self.load_identity().await?.0)
    }

    async fn load_uid(&self) -> Result<Option<u32>, StoreError> {
        Ok(self.load_identity().await?.1)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredIdentity {
    #[serde(default)]
    sid: Option<String>,
    #[serde(default)]
    uid: Option<String>,
}

impl StoredIdentity {
    fn into_pair(self) -> (Option<String>, Option<u32>) {
        let uid = self.uid();
        (self.sid, uid)
    }

    fn uid(&self) -> Option<u32> {
        let raw = self.uid.as_deref()?;
        match raw.parse() {
            Ok(uid) => Some(uid),
            Err(_) => {
                warn!(value = raw, "ignoring unparseable stored uid");
                None
            }
        }
    }
}

/// Volatile store, mostly for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<StoredIdentity>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn load_identity(&self) -> Result<(Option<String>, Option<u32>), StoreError> {
        Ok(self.inner.lock().await.clone().into_pair())
    }

    async fn save_identity(&self, sid: &str, uid: u32) -> Result<(), StoreError> {
        *self.inner.lock().await = StoredIdentity {
            sid: Some(sid.to_string()),
            uid: Some(uid.to_string()),
        };
        Ok(())
    }
}

/// JSON file store. A missing file reads as an empty store.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<StoredIdentity, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StoredIdentity::default())
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }
}

#[async_trait]
impl IdentityStore for FileStore {
    async fn load_identity(&self) -> Result<(Option<String>, Option<u32>), StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.into_pair())
    }

    async fn save_identity(&self, sid: &str, uid: u32) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let stored = StoredIdentity {
            sid: Some(sid.to_string()),
            uid: Some(uid.to_string()),
        };
        let raw = serde_json::to_string_pretty(&stored).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || replace_file(&path, raw.as_bytes()))
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))
            .and_then(|result| result)
            .map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

/// Write `contents` to a sibling temporary file, then rename it over `path`.
fn replace_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
