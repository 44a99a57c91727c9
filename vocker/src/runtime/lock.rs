//! Per-layer advisory locks.
//!
//! Uses flock on `<home>/locks/<name>.lock` so that two build processes whose
//! histories coincide never materialize the same layer at the same time. The
//! "exists, else create" decision for a layer is only made while its lock is
//! held.
//!
//! Lock files are empty and stay in place after the guard is dropped, one per
//! layer or tag name ever built. Unlinking one while another process waits on
//! it would hand out a second lock on a fresh inode, so they are only safe to
//! delete when no build is running on the home directory.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use vocker_shared::constants::layer_files;
use vocker_shared::errors::{VockerError, VockerResult};

/// A lock guard that holds an exclusive lock for one layer name.
///
/// The lock is automatically released when this guard is dropped,
/// or when the process exits/crashes.
#[derive(Debug)]
pub struct LayerLock {
    #[allow(dead_code)] // Held for lifetime, not directly accessed
    file: File,
    path: PathBuf,
}

impl LayerLock {
    /// Acquire the lock for `name`, waiting for any other holder.
    pub fn acquire(locks_dir: &Path, name: &str) -> VockerResult<Self> {
        let (file, path) = open_lock_file(locks_dir, name)?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;

            let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if result != 0 {
                return Err(VockerError::Storage(format!(
                    "failed to acquire lock {}: {}",
                    path.display(),
                    std::io::Error::last_os_error()
                )));
            }
        }

        #[cfg(not(unix))]
        {
            compile_error!("Layer locking is only implemented for unix");
        }

        tracing::trace!(lock_path = %path.display(), "Acquired layer lock");
        Ok(LayerLock { file, path })
    }

    /// Try to acquire the lock for `name` without waiting.
    ///
    /// # Returns
    /// * `Ok(Some(lock))` - Lock acquired
    /// * `Ok(None)` - Another holder currently owns the lock
    /// * `Err(...)` - The lock file could not be opened or locked
    pub fn try_acquire(locks_dir: &Path, name: &str) -> VockerResult<Option<Self>> {
        let (file, path) = open_lock_file(locks_dir, name)?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;

            let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
            if result != 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::WouldBlock {
                    return Ok(None);
                }
                return Err(VockerError::Storage(format!(
                    "failed to acquire lock {}: {}",
                    path.display(),
                    err
                )));
            }
        }

        tracing::trace!(lock_path = %path.display(), "Acquired layer lock");
        Ok(Some(LayerLock { file, path }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LayerLock {
    fn drop(&mut self) {
        // Released by the OS when the file closes; unlock explicitly anyway
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let fd = self.file.as_raw_fd();
            unsafe {
                libc::flock(fd, libc::LOCK_UN);
            }
        }

        tracing::trace!(lock_path = %self.path.display(), "Released layer lock");
    }
}

fn open_lock_file(locks_dir: &Path, name: &str) -> VockerResult<(File, PathBuf)> {
    std::fs::create_dir_all(locks_dir)
        .map_err(|e| VockerError::Storage(format!("failed to create locks dir: {}", e)))?;

    let path = locks_dir.join(format!("{}.{}", name, layer_files::LOCK_EXTENSION));

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .map_err(|e| {
            VockerError::Storage(format!(
                "failed to open lock file {}: {}",
                path.display(),
                e
            ))
        })?;

    Ok((file, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_lock() {
        let temp_dir = TempDir::new().unwrap();
        let lock = LayerLock::acquire(temp_dir.path(), "abc").unwrap();

        assert!(lock.path().exists());
        assert_eq!(lock.path(), temp_dir.path().join("abc.lock"));
    }

    #[test]
    fn test_lock_prevents_concurrent_access() {
        let temp_dir = TempDir::new().unwrap();

        let _lock1 = LayerLock::acquire(temp_dir.path(), "abc").unwrap();

        let second = LayerLock::try_acquire(temp_dir.path(), "abc").unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_lock_released_on_drop() {
        let temp_dir = TempDir::new().unwrap();

        {
            let _lock = LayerLock::acquire(temp_dir.path(), "abc").unwrap();
        }

        assert!(LayerLock::try_acquire(temp_dir.path(), "abc")
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_lock_file_outlives_guard() {
        let temp_dir = TempDir::new().unwrap();
        let path = LayerLock::acquire(temp_dir.path(), "abc")
            .unwrap()
            .path()
            .to_path_buf();

        assert!(path.is_file());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);

        // Relocking reuses the same file
        let again = LayerLock::acquire(temp_dir.path(), "abc").unwrap();
        assert_eq!(again.path(), path);
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_different_names_independent() {
        let temp_dir = TempDir::new().unwrap();

        let _lock1 = LayerLock::acquire(temp_dir.path(), "abc").unwrap();
        let lock2 = LayerLock::try_acquire(temp_dir.path(), "def").unwrap();

        assert!(lock2.is_some());
    }

    #[test]
    fn test_blocking_acquire_waits_for_release() {
        let temp_dir = TempDir::new().unwrap();
        let dir_path = Arc::new(temp_dir.path().to_path_buf());

        let lock1 = LayerLock::acquire(&dir_path, "abc").unwrap();

        let (tx, rx) = mpsc::channel();
        let dir_clone = Arc::clone(&dir_path);
        let handle = thread::spawn(move || {
            let lock = LayerLock::acquire(&dir_clone, "abc");
            tx.send(()).unwrap();
            lock
        });

        // Still held: the waiter must not get through yet
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

        drop(lock1);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(handle.join().unwrap().is_ok());
    }
}
