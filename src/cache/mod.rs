//! On-disk cache of built indexes.
//!
//! Each cache entry is a directory under the cache root named by its cache
//! key. An entry counts as present only when it carries the `.complete`
//! marker; entries are written into a temporary sibling directory and renamed
//! into place, so a crash mid-write leaves either nothing or an unmarked
//! directory that the next build discards.
//!
//! Builders for the same key are serialized twice over: an in-process async
//! mutex per key, and an exclusive `fs2` lock on `<root>/.locks/<key>.lock` for
//! other processes sharing the cache root.

use std::collections::HashMap;
use std::fs::{self, File};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use fs2::FileExt;
use thiserror::Error;
use tracing::{debug, warn};

/// Name of the marker file that certifies a fully written entry.
pub const COMPLETE_MARKER: &str = ".complete";

/// Subdirectory of the cache root holding the per-key lock files.
pub const LOCK_DIR: &str = ".locks";

/// Errors that can occur in the cache layer.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A file expected inside a complete entry is missing
    #[error("Cache file not found: {0}")]
    NotFound(String),

    /// Filesystem failure
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Entry contents could not be (de)serialized
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The cross-process lock could not be taken
    #[error("Lock error: {0}")]
    LockError(String),
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Whether `get_or_compute` served the value from disk or built it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Built,
}

/// A value that can be stored as a cache entry directory.
pub trait CacheValue: Sized {
    /// Write the value's files into `dir` (which already exists and is empty).
    fn save(&self, dir: &Path) -> CacheResult<()>;

    /// Read the value back from a complete entry directory.
    fn load(dir: &Path) -> CacheResult<Self>;
}

/// Deterministic cache key for a (topic, paper count, full-text) request.
///
/// Spaces and path separators in the topic become underscores, so the key is
/// always a single path component. The flag renders as `True`/`False` so keys
/// match the historical directory names.
pub fn cache_key(research_space: &str, num_papers: usize, full_text: bool) -> String {
    format!(
        "citation_{}_{}_full_text_{}",
        research_space.replace([' ', '/', '\\'], "_"),
        num_papers,
        if full_text { "True" } else { "False" }
    )
}

/// Filesystem cache rooted at a directory.
#[derive(Debug)]
pub struct IndexCache {
    root: PathBuf,
    key_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl IndexCache {
    /// Create a cache rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory an entry for `key` lives in.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Whether a fully written entry exists for `key`.
    pub fn is_complete(&self, key: &str) -> bool {
        self.entry_path(key).join(COMPLETE_MARKER).is_file()
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.key_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop the in-process lock for `key` once no caller holds or awaits it.
    fn release_key_lock(&self, key: &str) {
        let mut locks = match self.key_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }

    async fn lock_file(&self, key: &str) -> CacheResult<File> {
        let lock_dir = self.root.join(LOCK_DIR);
        fs::create_dir_all(&lock_dir)?;
        let lock_path = lock_dir.join(format!("{}.lock", key));

        tokio::task::spawn_blocking(move || -> CacheResult<File> {
            let file = File::create(&lock_path)?;
            file.lock_exclusive()
                .map_err(|e| CacheError::LockError(format!("{}: {}", lock_path.display(), e)))?;
            Ok(file)
        })
        .await
        .map_err(|e| CacheError::LockError(e.to_string()))?
    }

    /// Return the cached value for `key`, or run `compute` and store its result.
    ///
    /// At most one `compute` runs per key at a time; concurrent callers wait
    /// and then load what the first one stored. An error from `compute` is
    /// returned unchanged and nothing is written.
    pub async fn get_or_compute<V, E, F, Fut>(&self, key: &str, compute: F) -> Result<(V, CacheStatus), E>
    where
        V: CacheValue,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let result = {
            let key_lock = self.key_lock(key);
            let _guard = key_lock.lock().await;
            self.get_or_compute_exclusive(key, compute).await
        };
        self.release_key_lock(key);
        result
    }

    async fn get_or_compute_exclusive<V, E, F, Fut>(&self, key: &str, compute: F) -> Result<(V, CacheStatus), E>
    where
        V: CacheValue,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let lock_file = self.lock_file(key).await?;

        let result = self.get_or_compute_locked(key, compute).await;

        if let Err(e) = FileExt::unlock(&lock_file) {
            warn!("Failed to release cache lock for {}: {}", key, e);
        }
        result
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.key_locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    async fn get_or_compute_locked<V, E, F, Fut>(&self, key: &str, compute: F) -> Result<(V, CacheStatus), E>
    where
        V: CacheValue,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let entry = self.entry_path(key);

        if self.is_complete(key) {
            debug!("Cache hit: {}", entry.display());
            let value = V::load(&entry)?;
            return Ok((value, CacheStatus::Hit));
        }

        if entry.exists() {
            warn!("Discarding incomplete cache entry: {}", entry.display());
            fs::remove_dir_all(&entry).map_err(CacheError::from)?;
        }

        let value = compute().await?;
        self.store(key, &value)?;
        Ok((value, CacheStatus::Built))
    }

    /// Write `value` into a temp directory, mark it complete, and rename it into place.
    fn store<V: CacheValue>(&self, key: &str, value: &V) -> CacheResult<()> {
        fs::create_dir_all(&self.root)?;
        let staging = self.root.join(format!(".{}.tmp-{}", key, uuid::Uuid::new_v4()));
        fs::create_dir_all(&staging)?;

        let written = value
            .save(&staging)
            .and_then(|_| fs::write(staging.join(COMPLETE_MARKER), b"").map_err(CacheError::from))
            .and_then(|_| fs::rename(&staging, self.entry_path(key)).map_err(CacheError::from));

        if written.is_err() {
            let _ = fs::remove_dir_all(&staging);
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    struct Note(String);

    impl CacheValue for Note {
        fn save(&self, dir: &Path) -> CacheResult<()> {
            fs::write(dir.join("note.txt"), &self.0)?;
            Ok(())
        }

        fn load(dir: &Path) -> CacheResult<Self> {
            let path = dir.join("note.txt");
            if !path.exists() {
                return Err(CacheError::NotFound(path.display().to_string()));
            }
            Ok(Note(fs::read_to_string(path)?))
        }
    }

    #[derive(Debug)]
    enum TestError {
        Cache(CacheError),
        Compute(&'static str),
    }

    impl From<CacheError> for TestError {
        fn from(e: CacheError) -> Self {
            TestError::Cache(e)
        }
    }

    #[test]
    fn test_cache_key_format() {
        assert_eq!(
            cache_key("graph neural networks", 10, false),
            "citation_graph_neural_networks_10_full_text_False"
        );
        assert_eq!(cache_key("llm", 5, true), "citation_llm_5_full_text_True");
    }

    #[test]
    fn test_cache_key_is_single_path_component() {
        assert_eq!(
            cache_key("AI/ML safety", 10, false),
            "citation_AI_ML_safety_10_full_text_False"
        );
        assert_eq!(cache_key(r"C\C++ tooling", 3, true), "citation_C_C++_tooling_3_full_text_True");
        assert_eq!(std::path::Path::new(&cache_key("a/b/c", 1, false)).components().count(), 1);
    }

    #[tokio::test]
    async fn test_lock_files_live_in_lock_dir_and_locks_are_released() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(dir.path());

        cache
            .get_or_compute::<_, TestError, _, _>("k", || async { Ok(Note("v".to_string())) })
            .await
            .unwrap();

        assert!(dir.path().join(LOCK_DIR).join("k.lock").is_file());
        assert!(!dir.path().join("k.lock").exists());
        assert_eq!(cache.tracked_locks(), 0);

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec![LOCK_DIR.to_string(), "k".to_string()]);
    }

    #[test]
    fn test_cache_key_deterministic_and_distinct() {
        let base = cache_key("quantum computing", 20, false);
        assert_eq!(base, cache_key("quantum computing", 20, false));
        assert_ne!(base, cache_key("quantum chemistry", 20, false));
        assert_ne!(base, cache_key("quantum computing", 21, false));
        assert_ne!(base, cache_key("quantum computing", 20, true));
    }

    #[tokio::test]
    async fn test_get_or_compute_builds_then_hits() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(dir.path());
        let calls = AtomicUsize::new(0);

        for expected in [CacheStatus::Built, CacheStatus::Hit] {
            let (value, status) = cache
                .get_or_compute::<_, TestError, _, _>("k", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Note("hello".to_string()))
                })
                .await
                .unwrap();
            assert_eq!(value, Note("hello".to_string()));
            assert_eq!(status, expected);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_complete("k"));
        assert!(dir.path().join("k").join("note.txt").exists());
    }

    #[tokio::test]
    async fn test_compute_error_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(dir.path());

        let result = cache
            .get_or_compute::<Note, TestError, _, _>("k", || async { Err(TestError::Compute("boom")) })
            .await;

        assert!(matches!(result, Err(TestError::Compute("boom"))));
        assert!(!cache.entry_path("k").exists());
    }

    #[tokio::test]
    async fn test_incomplete_entry_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(dir.path());
        fs::create_dir_all(cache.entry_path("k")).unwrap();
        fs::write(cache.entry_path("k").join("note.txt"), "partial").unwrap();

        let (value, status) = cache
            .get_or_compute::<_, TestError, _, _>("k", || async { Ok(Note("fresh".to_string())) })
            .await
            .unwrap();

        assert_eq!(status, CacheStatus::Built);
        assert_eq!(value, Note("fresh".to_string()));
        assert_eq!(fs::read_to_string(cache.entry_path("k").join("note.txt")).unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_complete_entry_with_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(dir.path());
        fs::create_dir_all(cache.entry_path("k")).unwrap();
        fs::write(cache.entry_path("k").join(COMPLETE_MARKER), "").unwrap();

        let result = cache
            .get_or_compute::<Note, TestError, _, _>("k", || async { Ok(Note("never".to_string())) })
            .await;

        assert!(matches!(result, Err(TestError::Cache(CacheError::NotFound(_)))));
    }

    #[tokio::test]
    async fn test_concurrent_callers_compute_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(IndexCache::new(dir.path()));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute::<_, TestError, _, _>("shared", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok(Note("once".to_string()))
                    })
                    .await
                    .map(|(value, _)| value)
            }));
        }

        for handle in handles {
            let value = handle.await.unwrap().unwrap();
            assert_eq!(value, Note("once".to_string()));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.tracked_locks(), 0);
    }
}
