//! Durable key-value storage for the persisted session
//!
//! `KeyValueStore` is the small get/set/remove surface the session store
//! needs. `FileStore` keeps one JSON file per key; all writes use atomic
//! temp-file + rename so a crash mid-write never leaves a truncated record.
//! `MemoryStore` backs tests and sessions that should not outlive the process.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};

/// Boxed future returned by `KeyValueStore` methods.
pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// String-keyed, string-valued durable storage.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn KeyValueStore>`).
pub trait KeyValueStore: Send + Sync {
    /// Read a value; `None` if the key was never written or was removed.
    fn get_item<'a>(&'a self, key: &'a str) -> StorageFuture<'a, Option<String>>;

    /// Write or overwrite a value.
    fn set_item<'a>(&'a self, key: &'a str, value: String) -> StorageFuture<'a, ()>;

    /// Remove a value. Removing a missing key is not an error.
    fn remove_item<'a>(&'a self, key: &'a str) -> StorageFuture<'a, ()>;
}

/// File-per-key storage rooted at a directory.
///
/// Key `auth-storage` lives at `<dir>/auth-storage.json`. Files are 0600 on
/// unix since they contain bearer tokens.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Use `dir` as the storage root, creating it if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::Io(format!("creating storage dir {}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path backing `key`. Keys are namespace names, not user input, but path
    /// separators are still rejected.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(Error::Storage(format!("invalid storage key {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }

    async fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(format!("reading {}: {e}", path.display()))),
        }
    }

    async fn write(&self, key: &str, value: String) -> Result<()> {
        let path = self.path_for(key)?;
        write_atomic(&path, value.as_bytes()).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "removed persisted record");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(format!("removing {}: {e}", path.display()))),
        }
    }
}

impl KeyValueStore for FileStore {
    fn get_item<'a>(&'a self, key: &'a str) -> StorageFuture<'a, Option<String>> {
        Box::pin(self.read(key))
    }

    fn set_item<'a>(&'a self, key: &'a str, value: String) -> StorageFuture<'a, ()> {
        Box::pin(self.write(key, value))
    }

    fn remove_item<'a>(&'a self, key: &'a str) -> StorageFuture<'a, ()> {
        Box::pin(self.remove(key))
    }
}

/// Write bytes to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over the
/// target. Sets 0600 permissions before the rename on unix.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("storage path has no parent directory".into()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Io("storage path has no file name".into()))?;

    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, data)
        .await
        .map_err(|e| Error::Io(format!("writing temp file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp file: {e}")))?;

    debug!(path = %path.display(), "persisted record");
    Ok(())
}

/// In-process storage. Contents are lost when the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item<'a>(&'a self, key: &'a str) -> StorageFuture<'a, Option<String>> {
        Box::pin(async move { Ok(self.items.lock().await.get(key).cloned()) })
    }

    fn set_item<'a>(&'a self, key: &'a str, value: String) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            self.items.lock().await.insert(key.to_string(), value);
            Ok(())
        })
    }

    fn remove_item<'a>(&'a self, key: &'a str) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            self.items.lock().await.remove(key);
            Ok(())
        })
    }
}
