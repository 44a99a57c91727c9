//! Layer handles.
//!
//! A layer is a named qcow2 image in the images directory. Root layers are
//! base images; every other layer is a copy-on-write child of its parent.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use vocker_shared::errors::{VockerError, VockerResult};

use super::fingerprint::fingerprint;
use super::metadata::LayerMetadata;
use super::operation::Operation;
use crate::disk::{Disk, DiskFormat, Qcow2Helper};
use crate::runtime::layout::{image_path_in, metadata_path_in};
use crate::util::run_tool;

/// Named handle to a layer image, with the chain of parents it derives from.
#[derive(Debug, Clone)]
pub struct Layer {
    name: String,
    images_dir: PathBuf,
    parent: Option<Arc<Layer>>,
}

impl Layer {
    /// Handle to a root layer. Nothing is touched on disk.
    pub fn root(images_dir: &Path, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            images_dir: images_dir.to_path_buf(),
            parent: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<Layer>> {
        self.parent.as_ref()
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    /// `<images_dir>/<name>.qcow2`
    pub fn path(&self) -> PathBuf {
        image_path_in(&self.images_dir, &self.name)
    }

    pub fn metadata_path(&self) -> PathBuf {
        metadata_path_in(&self.images_dir, &self.name)
    }

    /// Child layer produced by applying `op` on top of this one.
    pub fn derive_for_operation(self: &Arc<Self>, op: &Operation) -> Layer {
        let name = fingerprint(&self.name, op);
        tracing::debug!("Derived {} from {} for {}", name, self.name, op);
        self.derive_named(name)
    }

    /// Child layer with a caller-chosen name.
    pub fn derive_named(self: &Arc<Self>, name: impl Into<String>) -> Layer {
        Layer {
            name: name.into(),
            images_dir: self.images_dir.clone(),
            parent: Some(Arc::clone(self)),
        }
    }

    /// True when the image file is present and was not left half-built.
    ///
    /// A file without a metadata sidecar counts as present; base images
    /// dropped into the images directory by hand have none.
    pub fn exists(&self) -> bool {
        if !self.path().is_file() {
            return false;
        }

        match LayerMetadata::load(&self.images_dir, &self.name) {
            Ok(Some(meta)) => meta.complete,
            Ok(None) => true,
            Err(e) => {
                tracing::warn!("Treating {} as missing: {}", self.name, e);
                false
            }
        }
    }

    /// Create this layer's image as a COW child of the parent image.
    ///
    /// Any previous file with this name is replaced. The returned disk
    /// deletes the file on drop; call [`Disk::release`] once the layer is
    /// complete.
    pub fn materialize(&self) -> VockerResult<Disk> {
        let parent = self.parent.as_ref().ok_or_else(|| {
            VockerError::Internal(format!("Root layer {} cannot be materialized", self.name))
        })?;

        let parent_path = parent.path();
        if !parent_path.is_file() {
            return Err(VockerError::Storage(format!(
                "Parent image {} is missing",
                parent_path.display()
            )));
        }

        let backing = std::fs::canonicalize(&parent_path).map_err(|e| {
            VockerError::Storage(format!(
                "Failed to resolve {}: {}",
                parent_path.display(),
                e
            ))
        })?;

        let virtual_size = Qcow2Helper::virtual_size(&backing)?;
        let path = self.path();

        tracing::debug!("Materializing {} on top of {}", self.name, parent.name);
        let disk = Qcow2Helper::create_cow_child_disk(&backing, DiskFormat::Qcow2, &path, virtual_size)?;

        // The image chain must mirror the logical chain
        match Qcow2Helper::backing_file(&path)? {
            Some(actual) if actual == backing => Ok(disk),
            other => Err(VockerError::Internal(format!(
                "Layer {} is backed by {:?}, expected {}",
                self.name,
                other,
                backing.display()
            ))),
        }
    }

    /// Flatten this layer and its whole backing chain into one standalone
    /// image at `destination`.
    pub async fn export_flat(
        &self,
        qemu_img: &str,
        destination: &Path,
        format: DiskFormat,
    ) -> VockerResult<()> {
        let source = self.path();
        tracing::info!(
            "Exporting {} to {} ({})",
            self.name,
            destination.display(),
            format
        );

        let args = [
            OsStr::new("convert"),
            OsStr::new("-O"),
            OsStr::new(format.as_str()),
            source.as_os_str(),
            destination.as_os_str(),
        ];

        run_tool(qemu_img, args).await.map_err(|e| {
            VockerError::Storage(format!(
                "Failed to export {} to {}: {}",
                self.name,
                destination.display(),
                e
            ))
        })?;

        Ok(())
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Check a user-supplied layer name (tags).
pub fn validate_layer_name(name: &str) -> VockerResult<()> {
    if name.is_empty() {
        return Err(VockerError::InvalidArgument("Tag must not be empty".into()));
    }
    if name.contains('/') || name.starts_with('.') || name.chars().any(char::is_whitespace) {
        return Err(VockerError::InvalidArgument(format!(
            "Invalid tag '{}': no '/', whitespace or leading '.' allowed",
            name
        )));
    }
    Ok(())
}

/// Check a name requested as a tag.
///
/// Besides the rules of [`validate_layer_name`], fingerprint-shaped names are
/// refused: they belong to derived layers.
pub fn validate_tag_name(name: &str) -> VockerResult<()> {
    validate_layer_name(name)?;
    if is_fingerprint(name) {
        return Err(VockerError::InvalidArgument(format!(
            "Invalid tag '{}': names of 64 hex digits are reserved for layers",
            name
        )));
    }
    Ok(())
}

fn is_fingerprint(name: &str) -> bool {
    name.len() == 64 && name.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
