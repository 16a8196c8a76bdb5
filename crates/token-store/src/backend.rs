//! Keyed state persistence backends
//!
//! `StateBackend` is the injected load/save pair the exhaustion store runs
//! on. The file backend keeps one JSON document per key under a state
//! directory, written atomically (temp file + rename) with 0600 permissions.
//! The memory backend serves tests and the no-persistence degraded mode.
//!
//! Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
//! (`Arc<dyn StateBackend>`).

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};

/// Keyed key-value persistence for small JSON state documents.
pub trait StateBackend: Send + Sync {
    /// Read the raw document stored under `key`, or `None` when the key is
    /// absent or unreadable. Unreadable state must degrade, not fail: the
    /// caller substitutes an empty record.
    fn load<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;

    /// Persist `value` under `key`, replacing any previous document.
    fn save<'a>(
        &'a self,
        key: &'a str,
        value: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// File-per-key backend rooted at a state directory.
pub struct FileBackend {
    dir: PathBuf,
    // Serializes writers; readers go straight to the filesystem since
    // rename is atomic on the platforms we target.
    write_lock: Mutex<()>,
}

impl FileBackend {
    /// Open a backend rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::Io(format!("creating state dir {}: {e}", dir.display())))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StateBackend for FileBackend {
    fn load<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.path_for(key);
            match tokio::fs::read_to_string(&path).await {
                Ok(contents) => Some(contents),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => {
                    debug!(key, error = %e, "state file unreadable, treating as absent");
                    None
                }
            }
        })
    }

    fn save<'a>(
        &'a self,
        key: &'a str,
        value: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            write_atomic(&self.path_for(key), &value).await
        })
    }
}

/// Write a state document atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target so a crash mid-write cannot leave a torn document. 0600
/// permissions since the keys inside are credentials.
async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("state path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".state.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, contents.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp state file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting state file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp state file: {e}")))?;

    debug!(path = %path.display(), "persisted state");
    Ok(())
}

/// In-memory backend for tests and for running without persistence.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateBackend for MemoryBackend {
    fn load<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async move { self.state.lock().await.get(key).cloned() })
    }

    fn save<'a>(
        &'a self,
        key: &'a str,
        value: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.state.lock().await.insert(key.to_string(), value);
            Ok(())
        })
    }
}

/// Backend that refuses every write, for exercising the degraded path.
#[cfg(test)]
pub struct FailingBackend;

#[cfg(test)]
impl StateBackend for FailingBackend {
    fn load<'a>(&'a self, _key: &'a str) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async { None })
    }

    fn save<'a>(
        &'a self,
        _key: &'a str,
        _value: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async { Err(Error::Io("backend unavailable".into())) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_backend_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path().to_path_buf()).await.unwrap();

        backend
            .save("token-exhaustion-siliconflow", r#"{"day":"2025-03-01"}"#.into())
            .await
            .unwrap();

        let loaded = backend.load("token-exhaustion-siliconflow").await.unwrap();
        assert_eq!(loaded, r#"{"day":"2025-03-01"}"#);
    }

    #[tokio::test]
    async fn file_backend_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path().to_path_buf()).await.unwrap();
        assert!(backend.load("never-written").await.is_none());
    }

    #[tokio::test]
    async fn file_backend_creates_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested").join("state");
        let _backend = FileBackend::open(nested.clone()).await.unwrap();
        assert!(nested.is_dir());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_backend_sets_0600_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path().to_path_buf()).await.unwrap();
        backend.save("k", "{}".into()).await.unwrap();

        let metadata = tokio::fs::metadata(dir.path().join("k.json")).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "state file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn file_backend_overwrites_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path().to_path_buf()).await.unwrap();

        backend.save("k", "first".into()).await.unwrap();
        backend.save("k", "second".into()).await.unwrap();

        assert_eq!(backend.load("k").await.unwrap(), "second");
    }

    #[tokio::test]
    async fn memory_backend_roundtrip() {
        let backend = MemoryBackend::new();
        backend.save("k", "v".into()).await.unwrap();
        assert_eq!(backend.load("k").await.unwrap(), "v");
        assert!(backend.load("other").await.is_none());
    }
}
