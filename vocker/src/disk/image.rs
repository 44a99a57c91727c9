//! RAII-managed disk abstraction.
//!
//! Provides a disk wrapper that automatically cleans up on drop.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Disk image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskFormat {
    /// Flat raw disk image.
    Raw,
    /// QCOW2 (QEMU Copy-On-Write v2).
    Qcow2,
}

impl DiskFormat {
    /// Get string representation of this format, as understood by qemu-img.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiskFormat::Raw => "raw",
            DiskFormat::Qcow2 => "qcow2",
        }
    }
}

impl fmt::Display for DiskFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiskFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(DiskFormat::Raw),
            "qcow2" => Ok(DiskFormat::Qcow2),
            other => Err(format!("unknown disk format '{}'", other)),
        }
    }
}

/// Disk image file owned by the current step.
///
/// An owned disk deletes its file when dropped. The build pipeline holds one
/// for a layer while the layer's operation is applied, so a failed step never
/// leaves a file behind that a later run would take for a cache hit. Call
/// [`Disk::release`] once the file is complete.
#[derive(Debug)]
pub struct Disk {
    path: PathBuf,
    format: DiskFormat,
    /// Delete the file on drop
    owned: bool,
}

impl Disk {
    /// Disk whose file is removed when this handle is dropped.
    pub fn owned(path: PathBuf, format: DiskFormat) -> Self {
        Self {
            path,
            format,
            owned: true,
        }
    }

    /// Disk whose file outlives this handle (base images).
    pub fn kept(path: PathBuf, format: DiskFormat) -> Self {
        Self {
            path,
            format,
            owned: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> DiskFormat {
        self.format
    }

    /// Give up ownership: the file is kept and its path returned.
    pub fn release(mut self) -> PathBuf {
        self.owned = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for Disk {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }

        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Removed unfinished disk {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove disk {}: {}", self.path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_from_str() {
        assert_eq!("raw".parse::<DiskFormat>().unwrap(), DiskFormat::Raw);
        assert_eq!("QCOW2".parse::<DiskFormat>().unwrap(), DiskFormat::Qcow2);
        assert!("vmdk".parse::<DiskFormat>().is_err());
    }

    #[test]
    fn test_owned_disk_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("layer.qcow2");
        std::fs::write(&path, b"partial").unwrap();

        {
            let _disk = Disk::owned(path.clone(), DiskFormat::Qcow2);
        }

        assert!(!path.exists());
    }

    #[test]
    fn test_released_disk_survives() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("layer.qcow2");
        std::fs::write(&path, b"done").unwrap();

        let disk = Disk::owned(path.clone(), DiskFormat::Qcow2);
        assert_eq!(disk.release(), path);
        assert!(path.exists());
    }

    #[test]
    fn test_kept_disk_survives_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("base.qcow2");
        std::fs::write(&path, b"base").unwrap();

        drop(Disk::kept(path.clone(), DiskFormat::Qcow2));
        assert!(path.exists());
    }
}
