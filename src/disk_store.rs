//! On-disk store for downloaded sources, with budgeted eviction.
//!
//! A single flat directory; filenames are the source hash, file presence is
//! the index. After each write an asynchronous sweep re-evaluates the
//! directory against the size and free-space thresholds and deletes the
//! oldest files when either is crossed. Individual delete failures are
//! soft: counted, logged, never escalated.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::env::Environment;
use crate::error::LoadResult;
use crate::fingerprint::disk_file_name;

#[derive(Clone)]
pub struct DiskStore {
    dir: PathBuf,
    auto_clean: bool,
    max_size_bytes: u64,
    min_free_bytes: u64,
    clean_percent: f32,
    env: Arc<dyn Environment>,
}

impl DiskStore {
    pub fn new(
        dir: PathBuf,
        auto_clean: bool,
        max_size_bytes: u64,
        min_free_bytes: u64,
        clean_percent: f32,
        env: Arc<dyn Environment>,
    ) -> LoadResult<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            auto_clean,
            max_size_bytes,
            min_free_bytes,
            clean_percent,
            env,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic on-disk location for a source identifier.
    pub fn file_path(&self, source: &str) -> PathBuf {
        self.dir.join(disk_file_name(source))
    }

    pub fn exists(&self, source: &str) -> bool {
        self.file_path(source).is_file()
    }

    /// Persist bytes for a source. Writes a sibling temp file first so a
    /// partially written entry is never visible under the final name.
    pub fn write(&self, source: &str, data: &[u8]) -> LoadResult<PathBuf> {
        let path = self.file_path(source);
        let tmp = path.with_extension("part");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &path)?;
        self.clean_async();
        Ok(path)
    }

    /// Kick off the eviction sweep on a detached thread, off the write path.
    pub fn clean_async(&self) {
        if !self.auto_clean {
            return;
        }
        let store = self.clone();
        std::thread::Builder::new()
            .name("disk-store-sweep".into())
            .spawn(move || {
                store.sweep();
            })
            .expect("failed to spawn disk sweep thread");
    }

    /// Evaluate thresholds and, when crossed, delete the oldest files.
    /// Returns the number of files removed.
    pub fn sweep(&self) -> usize {
        let files = match self.list_files() {
            Ok(files) => files,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "eviction sweep could not list files");
                return 0;
            }
        };
        if files.is_empty() {
            return 0;
        }

        let dir_size: u64 = files.iter().map(|(_, size, _)| size).sum();
        let free = self.env.usable_space(&self.dir);
        if free >= self.min_free_bytes && dir_size < self.max_size_bytes {
            return 0;
        }
        debug!(
            dir = %self.dir.display(),
            dir_size,
            free,
            "disk budget crossed, evicting oldest files"
        );

        let mut files = files;
        files.sort_by_key(|(_, _, mtime)| *mtime);
        let remove_count = ((self.clean_percent * files.len() as f32).ceil() as usize)
            .min(files.len());

        let mut removed = 0;
        for (path, _, _) in files.into_iter().take(remove_count) {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => debug!(file = %path.display(), error = %e, "eviction delete failed"),
            }
        }
        debug!(removed, "eviction sweep finished");
        removed
    }

    /// Delete every stored file unconditionally. Returns the count removed.
    pub fn clear(&self) -> LoadResult<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.path().is_file() && std::fs::remove_file(entry.path()).is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn list_files(&self) -> std::io::Result<Vec<(PathBuf, u64, SystemTime)>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                files.push((path, meta.len(), mtime));
            }
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeEnvironment;
    use tempfile::TempDir;

    fn store(dir: &Path, max_size: u64, min_free: u64, env: Arc<dyn Environment>) -> DiskStore {
        DiskStore::new(dir.to_path_buf(), false, max_size, min_free, 0.4, env).unwrap()
    }

    fn roomy_env() -> Arc<dyn Environment> {
        Arc::new(FakeEnvironment::default())
    }

    #[test]
    fn test_write_then_exists() {
        let temp = TempDir::new().unwrap();
        let store = store(temp.path(), u64::MAX, 0, roomy_env());

        assert!(!store.exists("http://example.com/a.png"));
        store.write("http://example.com/a.png", b"data").unwrap();
        assert!(store.exists("http://example.com/a.png"));
    }

    #[test]
    fn test_write_leaves_no_temp_file() {
        let temp = TempDir::new().unwrap();
        let store = store(temp.path(), u64::MAX, 0, roomy_env());
        store.write("http://example.com/a.png", b"data").unwrap();

        let names: Vec<String> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(!names[0].ends_with(".part"));
    }

    #[test]
    fn test_animated_source_keeps_suffix() {
        let temp = TempDir::new().unwrap();
        let store = store(temp.path(), u64::MAX, 0, roomy_env());
        let path = store.file_path("http://example.com/anim.gif");
        assert!(path.to_string_lossy().ends_with(".gif"));
    }

    #[test]
    fn test_clear_counts_and_removes_all() {
        let temp = TempDir::new().unwrap();
        let store = store(temp.path(), u64::MAX, 0, roomy_env());
        for i in 0..5 {
            store
                .write(&format!("http://example.com/{i}.png"), b"data")
                .unwrap();
        }

        assert_eq!(store.clear().unwrap(), 5);
        for i in 0..5 {
            assert!(!store.exists(&format!("http://example.com/{i}.png")));
        }
    }

    #[test]
    fn test_sweep_removes_oldest_forty_percent() {
        let temp = TempDir::new().unwrap();
        // max size 1 byte forces the size trigger
        let store = store(temp.path(), 1, 0, roomy_env());

        let sources: Vec<String> = (0..10)
            .map(|i| format!("http://example.com/{i}.png"))
            .collect();
        for source in &sources {
            store.write(source, b"0123456789").unwrap();
            // Space out modification times so age ordering is unambiguous
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        let removed = store.sweep();
        assert_eq!(removed, 4);
        for source in &sources[..4] {
            assert!(!store.exists(source), "oldest entries should be gone");
        }
        for source in &sources[4..] {
            assert!(store.exists(source), "newest entries should survive");
        }
    }

    #[test]
    fn test_sweep_noop_under_thresholds() {
        let temp = TempDir::new().unwrap();
        let store = store(temp.path(), u64::MAX, 0, roomy_env());
        store.write("http://example.com/a.png", b"data").unwrap();

        assert_eq!(store.sweep(), 0);
        assert!(store.exists("http://example.com/a.png"));
    }

    #[test]
    fn test_sweep_triggers_on_low_free_space() {
        let temp = TempDir::new().unwrap();
        let env = Arc::new(FakeEnvironment {
            usable_space: 1024,
            ..FakeEnvironment::default()
        });
        let store = store(temp.path(), u64::MAX, 1024 * 1024, env);

        for i in 0..5 {
            store
                .write(&format!("http://example.com/{i}.png"), b"data")
                .unwrap();
        }

        // ceil(0.4 * 5) = 2
        assert_eq!(store.sweep(), 2);
    }

    #[test]
    fn test_sweep_empty_dir() {
        let temp = TempDir::new().unwrap();
        let store = store(temp.path(), 1, 0, roomy_env());
        assert_eq!(store.sweep(), 0);
    }
}
