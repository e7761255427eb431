//! File-per-key cache store with atomic writes.

use crate::error::{ReplayError, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use tracing::debug;

/// File extension for cache entries.
const ENTRY_EXT: &str = "txt";

/// Disk key-value store memoizing text responses.
///
/// Keys are request digests; values land as `<key>.txt` under the cache
/// directory. A write goes to a temp file first and is renamed into place,
/// so an interrupted write never leaves a usable but truncated entry.
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    /// Open a cache rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| ReplayError::io_with_path(e, &root))?;
        Ok(Self { root })
    }

    /// The cache directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path the entry for `key` lives at (whether or not it exists yet).
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.{}", key, ENTRY_EXT))
    }

    /// Whether an entry exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entry_path(key).exists()
    }

    /// Look up the cached value for `key`.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.entry_path(key);
        match fs::read_to_string(&path) {
            Ok(value) => {
                debug!("cache hit for {} at {}", key, path.display());
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ReplayError::io_with_path(e, path)),
        }
    }

    /// Persist `value` under `key`.
    ///
    /// Callers must only pass complete values; a partial or interrupted
    /// response is never written. The entry is treated as immutable once it
    /// exists.
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        let path = self.entry_path(key);

        // Unique temp name so concurrent writers cannot clobber each other
        // mid-write; the final rename is atomic.
        let temp_path = path.with_extension(format!(
            "{}.{}.{}.tmp",
            ENTRY_EXT,
            process::id(),
            thread_id()
        ));

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .map_err(|e| ReplayError::io_with_path(e, &temp_path))?;

            file.write_all(value.as_bytes())
                .map_err(|e| ReplayError::io_with_path(e, &temp_path))?;

            file.sync_all()
                .map_err(|e| ReplayError::io_with_path(e, &temp_path))?;
        }

        fs::rename(&temp_path, &path).map_err(|e| ReplayError::io_with_path(e, &path))?;

        debug!("cached {} bytes under {}", value.len(), path.display());
        Ok(())
    }
}

/// Get a unique thread identifier.
fn thread_id() -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    format!("{:?}", thread::current().id()).hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_then_get() {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskCache::new(temp_dir.path().join("responses")).unwrap();

        cache.put("abc123", "hello").unwrap();
        assert_eq!(cache.get("abc123").unwrap(), Some("hello".to_string()));
        assert!(cache.contains("abc123"));
    }

    #[test]
    fn test_miss_returns_none() {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskCache::new(temp_dir.path()).unwrap();

        assert_eq!(cache.get("missing").unwrap(), None);
        assert!(!cache.contains("missing"));
    }

    #[test]
    fn test_creates_nested_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("ctx").join("responses");

        let cache = DiskCache::new(&root).unwrap();
        assert!(root.exists());

        cache.put("k", "v").unwrap();
        assert_eq!(cache.entry_path("k"), root.join("k.txt"));
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskCache::new(temp_dir.path()).unwrap();

        cache.put("k1", "first").unwrap();
        cache.put("k2", "second").unwrap();

        let leftovers: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
