//! Build pipeline.
//!
//! [`BuildContext`] walks an operation list, deriving one layer per
//! operation and deciding for each whether a cached image can be reused or
//! the layer must be materialized and the operation applied.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use vocker_shared::errors::{VockerError, VockerResult};

use super::env::BuildEnv;
use super::layer::{Layer, validate_tag_name};
use super::metadata::LayerMetadata;
use super::operation::{ApplyTools, Operation, base_image_name};
use crate::guest::{BaseFetcher, GuestEditor};
use crate::runtime::layout::FilesystemLayout;
use crate::runtime::lock::LayerLock;

/// Cache behaviour of one build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    pub cache_hits: usize,
    pub cache_misses: usize,
}

/// One step of a dry run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedLayer {
    pub name: String,
    pub instruction: String,
    /// Whether a build right now would reuse this layer.
    pub cached: bool,
}

/// State of one build run.
///
/// Strictly sequential: operations are applied in order, each on top of the
/// layer produced by the previous one.
pub struct BuildContext<'a> {
    layout: &'a FilesystemLayout,
    fetcher: &'a dyn BaseFetcher,
    editor: &'a dyn GuestEditor,
    force_rebuild: bool,
    chain: Vec<Arc<Layer>>,
    env: BuildEnv,
    stats: BuildStats,
}

impl<'a> BuildContext<'a> {
    pub fn new(
        layout: &'a FilesystemLayout,
        fetcher: &'a dyn BaseFetcher,
        editor: &'a dyn GuestEditor,
        force_rebuild: bool,
    ) -> Self {
        Self {
            layout,
            fetcher,
            editor,
            force_rebuild,
            chain: Vec::new(),
            env: BuildEnv::new(),
            stats: BuildStats::default(),
        }
    }

    /// Layer produced by the last applied operation.
    pub fn current(&self) -> Option<&Arc<Layer>> {
        self.chain.last()
    }

    /// Every layer of this run, root first.
    pub fn chain(&self) -> &[Arc<Layer>] {
        &self.chain
    }

    pub fn env(&self) -> &BuildEnv {
        &self.env
    }

    pub fn stats(&self) -> BuildStats {
        self.stats
    }

    /// Apply every operation and return the final layer.
    ///
    /// Nothing is touched unless `ops` passes [`validate`].
    pub async fn run(&mut self, ops: &[Operation]) -> VockerResult<Arc<Layer>> {
        validate(ops)?;

        let total = ops.len();
        for (i, op) in ops.iter().enumerate() {
            tracing::info!("Step {}/{}: {}", i + 1, total, op);
            self.apply(op).await?;
        }

        self.current()
            .cloned()
            .ok_or_else(|| VockerError::Internal("Build produced no layers".into()))
    }

    /// Apply one operation on top of the current layer.
    ///
    /// The first operation of a run must be a base image; it becomes the root.
    async fn apply(&mut self, op: &Operation) -> VockerResult<()> {
        self.env = op.fold_env(std::mem::take(&mut self.env));

        let layer = match self.current().cloned() {
            None => self.apply_base(op).await?,
            Some(current) => self.apply_derived(&current, op).await?,
        };

        self.chain.push(Arc::new(layer));
        Ok(())
    }

    /// Derive a layer with a chosen name from the current one.
    ///
    /// The tag is always recreated, so it reflects the latest build even when
    /// the name was used before. Only an earlier tag may be replaced: naming a
    /// layer of this chain, a base image or a derived layer is refused.
    pub async fn tag(&mut self, name: &str) -> VockerResult<Arc<Layer>> {
        validate_tag_name(name)?;

        let current = self
            .current()
            .cloned()
            .ok_or_else(|| VockerError::InvalidArgument("Nothing to tag".into()))?;

        if self.chain.iter().any(|layer| layer.name() == name) {
            return Err(VockerError::InvalidArgument(format!(
                "Cannot tag as '{}': it names a layer of this build",
                name
            )));
        }

        let tagged = current.derive_named(name);
        let _lock = self.lock(tagged.name()).await?;
        ensure_retaggable(&tagged)?;

        tracing::info!("Tagging {} as {}", current, name);
        let meta = LayerMetadata::tag(name, current.name());
        let images_dir = self.layout.images_dir();

        meta.save(&images_dir)?;
        let disk = match tagged.materialize() {
            Ok(disk) => disk,
            Err(e) => {
                let _ = LayerMetadata::remove(&images_dir, name);
                return Err(e);
            }
        };
        meta.completed().save(&images_dir)?;
        disk.release();

        Ok(Arc::new(tagged))
    }

    /// Layer names a build of `ops` would produce, and which are cached now.
    pub fn plan(&self, ops: &[Operation]) -> VockerResult<Vec<PlannedLayer>> {
        validate(ops)?;

        let images_dir = self.layout.images_dir();
        let mut planned = Vec::with_capacity(ops.len());

        let mut current = Arc::new(Layer::root(&images_dir, base_image_name(ops[0].args())));
        planned.push(PlannedLayer {
            name: current.name().to_string(),
            instruction: ops[0].signature(),
            cached: current.exists(),
        });

        for op in &ops[1..] {
            let candidate = current.derive_for_operation(op);
            planned.push(PlannedLayer {
                name: candidate.name().to_string(),
                instruction: op.signature(),
                cached: candidate.exists() && !self.force_rebuild,
            });
            current = Arc::new(candidate);
        }

        Ok(planned)
    }

    async fn apply_base(&mut self, op: &Operation) -> VockerResult<Layer> {
        let Operation::BaseImage(template) = op else {
            return Err(VockerError::InvalidArgument(format!(
                "A build must start with FROM, got {}",
                op.keyword()
            )));
        };

        let images_dir = self.layout.images_dir();
        let root = Layer::root(&images_dir, base_image_name(template));
        let _lock = self.lock(root.name()).await?;

        let existed = root.path().is_file();
        let temp_dir = self.layout.temp_dir();
        op.apply(&root, &self.env, &self.tools(&temp_dir)).await?;

        if existed {
            self.stats.cache_hits += 1;
        } else {
            self.stats.cache_misses += 1;
            LayerMetadata::pending(root.name(), None, op.signature())
                .completed()
                .save(&images_dir)?;
        }

        Ok(root)
    }

    async fn apply_derived(&mut self, current: &Arc<Layer>, op: &Operation) -> VockerResult<Layer> {
        if op.is_base_image() {
            return Err(VockerError::InvalidArgument(format!(
                "FROM is only allowed as the first operation, got {} on top of {}",
                op, current
            )));
        }

        let candidate = current.derive_for_operation(op);
        let _lock = self.lock(candidate.name()).await?;

        if candidate.exists() && !self.force_rebuild {
            tracing::info!("Cache hit: {}", candidate);
            self.stats.cache_hits += 1;
            return Ok(candidate);
        }

        tracing::info!("Cache miss: {}", candidate);
        self.stats.cache_misses += 1;

        let images_dir = self.layout.images_dir();
        let meta = LayerMetadata::pending(candidate.name(), Some(current.name()), op.signature());
        meta.save(&images_dir)?;

        let temp_dir = self.layout.temp_dir();
        let result = match candidate.materialize() {
            Ok(disk) => match op.apply(&candidate, &self.env, &self.tools(&temp_dir)).await {
                Ok(()) => Ok(disk),
                Err(e) if e.is_recoverable() => {
                    tracing::error!("{}: {}", op.keyword(), e);
                    Ok(disk)
                }
                // Dropping the disk removes the half-built image
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        let disk = match result {
            Ok(disk) => disk,
            Err(e) => {
                if let Err(cleanup) = LayerMetadata::remove(&images_dir, candidate.name()) {
                    tracing::warn!("{}", cleanup);
                }
                return Err(e);
            }
        };

        meta.completed().save(&images_dir)?;
        disk.release();

        Ok(candidate)
    }

    fn tools<'t>(&'t self, temp_dir: &'t std::path::Path) -> ApplyTools<'t> {
        ApplyTools {
            fetcher: self.fetcher,
            editor: self.editor,
            temp_dir,
        }
    }

    /// Take the layer lock for `name` without blocking the runtime.
    async fn lock(&self, name: &str) -> VockerResult<LayerLock> {
        let locks_dir = self.layout.locks_dir();
        let name = name.to_string();

        let lock = tokio::task::spawn_blocking(move || -> VockerResult<LayerLock> {
            match LayerLock::try_acquire(&locks_dir, &name)? {
                Some(lock) => Ok(lock),
                None => {
                    tracing::info!("Waiting for another build of {}", name);
                    LayerLock::acquire(&locks_dir, &name)
                }
            }
        })
        .await
        .map_err(|e| VockerError::Internal(format!("Lock task failed: {}", e)))??;

        tracing::debug!("Holding {}", lock.path().display());
        Ok(lock)
    }
}

/// Refuse to overwrite anything but an earlier tag.
///
/// An image without a sidecar is a base image put in place by hand.
fn ensure_retaggable(layer: &Layer) -> VockerResult<()> {
    let taken = match LayerMetadata::load(layer.images_dir(), layer.name())? {
        Some(meta) => !meta.is_tag(),
        None => layer.path().exists(),
    };

    if taken {
        return Err(VockerError::InvalidArgument(format!(
            "Cannot tag as '{}': an image layer with that name exists",
            layer.name()
        )));
    }
    Ok(())
}

/// Check the shape of an operation list: non-empty, exactly one base image,
/// and that one first.
pub fn validate(ops: &[Operation]) -> VockerResult<()> {
    let Some(first) = ops.first() else {
        return Err(VockerError::InvalidArgument(
            "No operations to build".into(),
        ));
    };

    if !first.is_base_image() {
        return Err(VockerError::InvalidArgument(format!(
            "A build must start with FROM, got {}",
            first.keyword()
        )));
    }

    if let Some(pos) = ops[1..].iter().position(Operation::is_base_image) {
        return Err(VockerError::InvalidArgument(format!(
            "Only one FROM is supported, found another at operation {}",
            pos + 2
        )));
    }

    Ok(())
}
