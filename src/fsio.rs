//! Cross-process file locking and atomic writes.
//!
//! Correctness across editor processes rests on two primitives: an advisory
//! lock file created with exclusive-create semantics, and temp-then-rename
//! publication of every durable file. Readers never take the lock; they may
//! see a pre-rename version of a file but never a half-written one.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::{MemorixError, Result};

/// Name of the advisory lock file inside the data directory.
pub const LOCK_FILE: &str = ".memorix.lock";

/// Interval between acquisition attempts.
const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Maximum acquisition attempts (~3 s total).
const MAX_ATTEMPTS: u32 = 60;

/// A lock whose mtime is older than this is owned by a crashed process.
const STALE_AFTER: Duration = Duration::from_secs(10);

/// Acquire the advisory lock at `lock_path`.
///
/// Retries on collision every 50 ms up to 60 attempts. A lock file whose
/// modification time is older than 10 s is treated as stale, unlinked, and
/// acquisition retries immediately. After the retry budget is exhausted one
/// force-unlink-then-create is attempted before giving up with
/// [`MemorixError::LockTimeout`].
///
/// The file contents (`{pid, time}`) exist for debugging only; correctness
/// depends on the exclusive create, not on what is written.
pub fn acquire(lock_path: &Path) -> Result<()> {
    for _ in 0..MAX_ATTEMPTS {
        if try_create(lock_path)? {
            return Ok(());
        }
        if is_stale(lock_path) {
            // Crashed owner: remove and retry without waiting.
            let _ = std::fs::remove_file(lock_path);
            continue;
        }
        std::thread::sleep(RETRY_INTERVAL);
    }

    // Last resort: assume the owner is gone and take the lock by force.
    let _ = std::fs::remove_file(lock_path);
    if try_create(lock_path)? {
        return Ok(());
    }

    Err(MemorixError::LockTimeout {
        path: lock_path.to_path_buf(),
    })
}

/// Release the lock. Best-effort; a missing lock file is not an error.
pub fn release(lock_path: &Path) {
    let _ = std::fs::remove_file(lock_path);
}

/// Run `action` while holding `<dir>/.memorix.lock`.
///
/// The lock is released on every exit path, including panics, via a drop
/// guard.
pub fn with_lock<T>(dir: &Path, action: impl FnOnce() -> Result<T>) -> Result<T> {
    let lock_path = dir.join(LOCK_FILE);
    acquire(&lock_path)?;
    let _guard = LockGuard { path: lock_path };
    action()
}

/// Write `data` to `path` atomically: write `path.tmp.<pid>`, then rename.
///
/// Rename is atomic within one directory on the target filesystems; callers
/// must not point the temp and final paths at different filesystems.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);
    std::fs::write(&tmp, data).map_err(|e| MemorixError::io("write", &tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| MemorixError::io("rename", path, e))
}

struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        release(&self.path);
    }
}

/// Attempt one exclusive create. Ok(false) on collision.
fn try_create(lock_path: &Path) -> Result<bool> {
    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path)
    {
        Ok(mut file) => {
            let info = serde_json::json!({
                "pid": std::process::id(),
                "time": chrono::Utc::now().to_rfc3339(),
            });
            let _ = file.write_all(info.to_string().as_bytes());
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(MemorixError::io("create lock", lock_path, e)),
    }
}

fn is_stale(lock_path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(lock_path) else {
        return false;
    };
    let Ok(mtime) = meta.modified() else {
        return false;
    };
    SystemTime::now()
        .duration_since(mtime)
        .map(|age| age > STALE_AFTER)
        .unwrap_or(false)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".tmp.{}", std::process::id()));
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_and_release() {
        let tmp = TempDir::new().unwrap();
        let lock = tmp.path().join(LOCK_FILE);

        acquire(&lock).unwrap();
        assert!(lock.exists());
        release(&lock);
        assert!(!lock.exists());
    }

    #[test]
    fn release_of_missing_lock_is_ok() {
        let tmp = TempDir::new().unwrap();
        release(&tmp.path().join(LOCK_FILE));
    }

    #[test]
    fn lock_contents_are_debug_json() {
        let tmp = TempDir::new().unwrap();
        let lock = tmp.path().join(LOCK_FILE);
        acquire(&lock).unwrap();

        let contents = std::fs::read_to_string(&lock).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed["pid"], std::process::id());
        release(&lock);
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let tmp = TempDir::new().unwrap();
        let lock = tmp.path().join(LOCK_FILE);
        std::fs::write(&lock, "{}").unwrap();

        // Age the lock past the staleness window.
        let old = SystemTime::now() - Duration::from_secs(30);
        let file = std::fs::OpenOptions::new().write(true).open(&lock).unwrap();
        file.set_modified(old).unwrap();
        drop(file);

        // Should succeed without waiting out the full retry budget.
        let start = std::time::Instant::now();
        acquire(&lock).unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        release(&lock);
    }

    #[test]
    fn with_lock_releases_on_error() {
        let tmp = TempDir::new().unwrap();

        let result: Result<()> = with_lock(tmp.path(), || {
            Err(MemorixError::NotFound("forced failure".into()))
        });
        assert!(result.is_err());
        assert!(!tmp.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn atomic_write_replaces_contents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data.json");

        atomic_write(&path, b"[1]").unwrap();
        atomic_write(&path, b"[1,2]").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[1,2]");
        // No temp droppings left behind.
        let leftovers: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }
}
