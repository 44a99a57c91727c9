use std::path::{Path, PathBuf};

use vocker_shared::constants::layer_files;
use vocker_shared::errors::{VockerError, VockerResult};

/// Directory structure constants
pub mod dirs {
    /// Directory name for vocker data under the user's cache dir
    pub const VOCKER_DIR: &str = "vocker";

    /// Subdirectory for layer images and their metadata sidecars
    pub const IMAGES_DIR: &str = "images";

    /// Subdirectory for per-layer lock files
    pub const LOCKS_DIR: &str = "locks";

    /// Subdirectory for log files
    pub const LOGS_DIR: &str = "logs";

    /// Subdirectory for in-flight downloads
    pub const TEMP_DIR: &str = "tmp";
}

// ============================================================================
// FILESYSTEM LAYOUT (home directory)
// ============================================================================

/// On-disk layout of a vocker home directory.
///
/// ```text
/// ~/.cache/vocker/
/// ├── images/
/// │   ├── fedora-23.qcow2     # base image (fetched)
/// │   ├── 3f1c...e9.qcow2     # derived layer, named by fingerprint
/// │   ├── 3f1c...e9.json      # layer metadata sidecar
/// │   └── myapp.qcow2         # tag
/// ├── locks/                  # empty flock files, never removed by builds
/// │   └── 3f1c...e9.lock
/// ├── logs/
/// └── tmp/
/// ```
#[derive(Clone, Debug)]
pub struct FilesystemLayout {
    home_dir: PathBuf,
}

impl FilesystemLayout {
    pub fn new(home_dir: PathBuf) -> Self {
        Self { home_dir }
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    /// Layer storage root: ~/.cache/vocker/images
    pub fn images_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::IMAGES_DIR)
    }

    /// Per-layer locks directory: ~/.cache/vocker/locks
    ///
    /// Grows by one empty file per layer name. Safe to clear only while no
    /// build is running.
    pub fn locks_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::LOCKS_DIR)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::LOGS_DIR)
    }

    /// Temporary directory for transient files: ~/.cache/vocker/tmp
    /// Downloads land here first so the final rename into images/ stays on
    /// the same filesystem.
    pub fn temp_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::TEMP_DIR)
    }

    /// Image file for a layer name.
    pub fn image_path(&self, name: &str) -> PathBuf {
        image_path_in(&self.images_dir(), name)
    }

    /// Initialize the filesystem structure.
    ///
    /// Idempotent: existing directories are left untouched.
    pub fn prepare(&self) -> VockerResult<()> {
        std::fs::create_dir_all(&self.home_dir)
            .map_err(|e| VockerError::Storage(format!("failed to create home: {e}")))?;

        std::fs::create_dir_all(self.images_dir())
            .map_err(|e| VockerError::Storage(format!("failed to create images dir: {e}")))?;

        std::fs::create_dir_all(self.locks_dir())
            .map_err(|e| VockerError::Storage(format!("failed to create locks dir: {e}")))?;

        std::fs::create_dir_all(self.temp_dir())
            .map_err(|e| VockerError::Storage(format!("failed to create temp dir: {e}")))?;

        std::fs::create_dir_all(self.logs_dir())
            .map_err(|e| VockerError::Storage(format!("failed to create logs dir: {e}")))?;

        tracing::debug!(images_dir = %self.images_dir().display(), "Using images dir");
        Ok(())
    }
}

/// `<images_dir>/<name>.qcow2`
pub(crate) fn image_path_in(images_dir: &Path, name: &str) -> PathBuf {
    images_dir.join(format!("{}.{}", name, layer_files::IMAGE_EXTENSION))
}

/// `<images_dir>/<name>.json`
pub(crate) fn metadata_path_in(images_dir: &Path, name: &str) -> PathBuf {
    images_dir.join(format!("{}.{}", name, layer_files::METADATA_EXTENSION))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_prepare_creates_tree() {
        let temp = TempDir::new().unwrap();
        let layout = FilesystemLayout::new(temp.path().join("home"));

        layout.prepare().unwrap();

        assert!(layout.images_dir().is_dir());
        assert!(layout.locks_dir().is_dir());
        assert!(layout.temp_dir().is_dir());
        assert!(layout.logs_dir().is_dir());
    }

    #[test]
    fn test_prepare_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let layout = FilesystemLayout::new(temp.path().to_path_buf());

        layout.prepare().unwrap();
        std::fs::write(layout.images_dir().join("keep.qcow2"), b"x").unwrap();
        layout.prepare().unwrap();

        assert!(layout.images_dir().join("keep.qcow2").exists());
    }

    #[test]
    fn test_layer_paths() {
        let layout = FilesystemLayout::new(PathBuf::from("/var/cache/vocker"));

        assert_eq!(
            layout.image_path("fedora-23"),
            PathBuf::from("/var/cache/vocker/images/fedora-23.qcow2")
        );
        assert_eq!(
            metadata_path_in(&layout.images_dir(), "abc"),
            PathBuf::from("/var/cache/vocker/images/abc.json")
        );
    }
}
