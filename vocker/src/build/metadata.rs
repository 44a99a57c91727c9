//! Layer metadata sidecars (`<images>/<name>.json`).

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vocker_shared::constants::layer_files;
use vocker_shared::errors::{VockerError, VockerResult};

use crate::runtime::layout::metadata_path_in;

/// Instruction keyword recorded for tag layers.
const TAG_KEYWORD: &str = "TAG";

/// What the pipeline knows about a layer it wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerMetadata {
    pub name: String,
    pub parent: Option<String>,
    /// Directive that produced the layer, e.g. `RUN make`. `TAG <name>` for tags.
    pub instruction: String,
    pub created_at: DateTime<Utc>,
    /// False until the producing operation applied successfully.
    pub complete: bool,
}

impl LayerMetadata {
    /// Marker written before a layer's file is created.
    pub fn pending(name: &str, parent: Option<&str>, instruction: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            parent: parent.map(str::to_string),
            instruction: instruction.into(),
            created_at: Utc::now(),
            complete: false,
        }
    }

    /// Marker for a tag of `parent`.
    pub fn tag(name: &str, parent: &str) -> Self {
        Self::pending(name, Some(parent), format!("{} {}", TAG_KEYWORD, name))
    }

    /// Whether this layer was written by tagging.
    pub fn is_tag(&self) -> bool {
        self.instruction
            .strip_prefix(TAG_KEYWORD)
            .is_some_and(|rest| rest.starts_with(' '))
    }

    pub fn completed(mut self) -> Self {
        self.complete = true;
        self
    }

    /// Read the sidecar for `name`.
    ///
    /// Ok(None) when no sidecar exists. A sidecar that cannot be decoded is a
    /// `Storage` error.
    pub fn load(images_dir: &Path, name: &str) -> VockerResult<Option<Self>> {
        let path = metadata_path_in(images_dir, name);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(VockerError::Storage(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        serde_json::from_slice(&data).map(Some).map_err(|e| {
            VockerError::Storage(format!("Corrupt layer metadata {}: {}", path.display(), e))
        })
    }

    /// Write the sidecar atomically (temp file + rename).
    pub fn save(&self, images_dir: &Path) -> VockerResult<()> {
        let path = metadata_path_in(images_dir, &self.name);
        let temp = images_dir.join(format!(
            ".{}.{}.tmp",
            self.name,
            uuid::Uuid::new_v4().simple()
        ));

        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| VockerError::Internal(format!("Failed to encode metadata: {}", e)))?;

        std::fs::write(&temp, json)
            .and_then(|_| std::fs::rename(&temp, &path))
            .map_err(|e| {
                let _ = std::fs::remove_file(&temp);
                VockerError::Storage(format!("Failed to write {}: {}", path.display(), e))
            })
    }

    /// Remove the sidecar for `name`, if any.
    pub fn remove(images_dir: &Path, name: &str) -> VockerResult<()> {
        let path = metadata_path_in(images_dir, name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VockerError::Storage(format!(
                "Failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Every readable sidecar in `images_dir`, oldest first.
    ///
    /// Undecodable sidecars are skipped with a warning.
    pub fn list(images_dir: &Path) -> VockerResult<Vec<Self>> {
        let entries = match std::fs::read_dir(images_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(VockerError::Storage(format!(
                    "Failed to list {}: {}",
                    images_dir.display(),
                    e
                )));
            }
        };

        let mut layers: Vec<Self> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter_map(|path| sidecar_name(&path))
            .filter_map(|name| match Self::load(images_dir, &name) {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::warn!("Skipping layer {}: {}", name, e);
                    None
                }
            })
            .collect();

        layers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(layers)
    }
}

/// Layer name for a `<name>.json` path; None for anything else.
fn sidecar_name(path: &Path) -> Option<String> {
    if path.extension()? != layer_files::METADATA_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.starts_with('.') {
        return None;
    }
    Some(stem.to_string())
}
