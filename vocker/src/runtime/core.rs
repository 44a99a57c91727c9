//! High-level build runtime.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use vocker_shared::errors::{VockerError, VockerResult};

use crate::build::{
    self, BuildContext, BuildStats, Layer, LayerMetadata, ParseError, Parsed, PlannedLayer,
};
use crate::disk::DiskFormat;
use crate::guest::{BaseFetcher, GuestEditor, Guestfish, VirtBuilder};
use crate::runtime::layout::FilesystemLayout;
use crate::runtime::options::{BuildOptions, VockerOptions};

// ============================================================================
// PUBLIC API
// ============================================================================

/// Entry point for building, listing and exporting layer images.
///
/// **Cloning**: Runtime is cheaply cloneable via `Arc`; all clones share the
/// same layout and collaborators. Builds from several runtimes (or processes)
/// on one home directory are safe: layer creation is serialized per layer
/// name with file locks.
#[derive(Clone)]
pub struct VockerRuntime {
    inner: RuntimeInner,
}

pub type RuntimeInner = Arc<RuntimeInnerImpl>;

/// Immutable runtime resources. Nothing here changes after creation, so no
/// lock is needed.
pub struct RuntimeInnerImpl {
    pub(crate) layout: FilesystemLayout,
    pub(crate) options: VockerOptions,
    pub(crate) fetcher: Arc<dyn BaseFetcher>,
    pub(crate) editor: Arc<dyn GuestEditor>,
}

/// Result of a successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOutcome {
    /// Final layer of the chain.
    pub layer: String,
    /// Tag layer, when one was requested.
    pub tag: Option<String>,
    /// Every layer of the chain, base image first.
    pub layers: Vec<String>,
    /// Script lines that were skipped.
    #[serde(skip)]
    pub parse_errors: Vec<ParseError>,
    pub stats: BuildStats,
}

impl BuildOutcome {
    /// Name to address the result by: the tag if any, else the final layer.
    pub fn identity(&self) -> &str {
        self.tag.as_deref().unwrap_or(&self.layer)
    }
}

/// Result of a dry run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    pub layers: Vec<PlannedLayer>,
    pub parse_errors: Vec<ParseError>,
}

// ============================================================================
// RUNTIME IMPLEMENTATION
// ============================================================================

impl VockerRuntime {
    /// Create a runtime that shells out to `virt-builder` and `guestfish`.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `home_dir` is not absolute
    /// - The home directory tree cannot be created
    pub fn new(options: VockerOptions) -> VockerResult<Self> {
        let fetcher = Arc::new(VirtBuilder::new(options.tools.virt_builder.clone()));
        let editor = Arc::new(Guestfish::new(options.tools.guestfish.clone()));
        Self::with_collaborators(options, fetcher, editor)
    }

    /// Create a runtime with default options.
    pub fn with_defaults() -> VockerResult<Self> {
        Self::new(VockerOptions::default())
    }

    /// Create a runtime with caller-supplied collaborators.
    pub fn with_collaborators(
        options: VockerOptions,
        fetcher: Arc<dyn BaseFetcher>,
        editor: Arc<dyn GuestEditor>,
    ) -> VockerResult<Self> {
        if !options.home_dir.is_absolute() {
            return Err(VockerError::Config(format!(
                "home_dir must be absolute path, got: {}",
                options.home_dir.display()
            )));
        }

        let layout = FilesystemLayout::new(options.home_dir.clone());
        layout.prepare().map_err(|e| {
            VockerError::Storage(format!(
                "Failed to initialize filesystem at {}: {}",
                layout.home_dir().display(),
                e
            ))
        })?;

        let inner = Arc::new(RuntimeInnerImpl {
            layout,
            options,
            fetcher,
            editor,
        });

        tracing::debug!("initialized runtime");

        Ok(Self { inner })
    }

    pub fn layout(&self) -> &FilesystemLayout {
        &self.inner.layout
    }

    /// Parse `script` and build it.
    ///
    /// Unparseable lines are skipped and reported in the outcome. Any
    /// provisioning, storage or guest failure aborts the build.
    pub async fn build(&self, script: &str, options: &BuildOptions) -> VockerResult<BuildOutcome> {
        self.build_parsed(build::parse(script), options).await
    }

    /// Read, parse and build a script file.
    pub async fn build_file(&self, path: &Path, options: &BuildOptions) -> VockerResult<BuildOutcome> {
        self.build_parsed(build::parse_file(path)?, options).await
    }

    /// Layers a build of `script` would produce, without building anything.
    pub fn plan(&self, script: &str, options: &BuildOptions) -> VockerResult<BuildPlan> {
        let parsed = build::parse(script);
        if let Some(tag) = &options.tag {
            build::validate_tag_name(tag)?;
        }
        let ctx = self.context(options.force_rebuild);

        Ok(BuildPlan {
            layers: ctx.plan(&parsed.operations)?,
            parse_errors: parsed.errors,
        })
    }

    /// Flatten layer `name` and its backing chain into `destination`.
    ///
    /// # Errors
    ///
    /// `NotFound` if no complete layer named `name` exists.
    pub async fn export(&self, name: &str, destination: &Path, format: DiskFormat) -> VockerResult<()> {
        build::validate_layer_name(name)?;

        let layer = Layer::root(&self.inner.layout.images_dir(), name);
        if !layer.exists() {
            return Err(VockerError::NotFound(format!("No such image: {}", name)));
        }

        layer
            .export_flat(&self.inner.options.tools.qemu_img, destination, format)
            .await
    }

    /// Metadata of every layer this home directory holds, oldest first.
    pub fn images(&self) -> VockerResult<Vec<LayerMetadata>> {
        LayerMetadata::list(&self.inner.layout.images_dir())
    }
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

impl VockerRuntime {
    fn context(&self, force_rebuild: bool) -> BuildContext<'_> {
        BuildContext::new(
            &self.inner.layout,
            self.inner.fetcher.as_ref(),
            self.inner.editor.as_ref(),
            force_rebuild,
        )
    }

    async fn build_parsed(&self, parsed: Parsed, options: &BuildOptions) -> VockerResult<BuildOutcome> {
        if !parsed.errors.is_empty() {
            tracing::warn!("Skipped {} unparseable line(s)", parsed.errors.len());
        }

        if let Some(tag) = &options.tag {
            build::validate_tag_name(tag)?;
        }

        let mut ctx = self.context(options.force_rebuild);
        let layer = ctx.run(&parsed.operations).await?;

        let tag = match &options.tag {
            Some(name) => Some(ctx.tag(name).await?.name().to_string()),
            None => None,
        };

        let stats = ctx.stats();
        tracing::info!(
            "Built {} ({} cached, {} built)",
            tag.as_deref().unwrap_or(layer.name()),
            stats.cache_hits,
            stats.cache_misses
        );

        Ok(BuildOutcome {
            layer: layer.name().to_string(),
            tag,
            layers: ctx.chain().iter().map(|l| l.name().to_string()).collect(),
            parse_errors: parsed.errors,
            stats,
        })
    }
}

impl std::fmt::Debug for VockerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VockerRuntime")
            .field("home_dir", &self.inner.layout.home_dir())
            .finish()
    }
}

// ============================================================================
// THREAD SAFETY ASSERTIONS
// ============================================================================

const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    let _ = assert_send_sync::<VockerRuntime>;
};
