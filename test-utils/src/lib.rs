//! Test helpers shared by the vocker crates.
//!
//! Provides recording fakes for the external collaborators so the build
//! pipeline can run end to end without virt-builder or guestfish.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use vocker::disk::Qcow2Helper;
use vocker::guest::{BaseFetcher, GuestEditor};
use vocker::{VockerOptions, VockerRuntime};
use vocker_shared::errors::{VockerError, VockerResult};

/// Virtual size of fake base images.
pub const BASE_IMAGE_SIZE_GB: u64 = 1;

// ============================================================================
// FETCHER
// ============================================================================

/// Base fetcher that writes an empty qcow2 image and remembers each request.
#[derive(Debug, Default)]
pub struct RecordingFetcher {
    templates: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fetcher for which every template is unavailable.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Templates requested so far, in order.
    pub fn templates(&self) -> Vec<String> {
        self.templates.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.templates.lock().len()
    }
}

#[async_trait]
impl BaseFetcher for RecordingFetcher {
    async fn fetch(&self, template: &str, destination: &Path) -> VockerResult<()> {
        self.templates.lock().push(template.to_string());

        if self.fail {
            return Err(VockerError::Provisioning(format!(
                "template '{}' not available",
                template
            )));
        }

        Qcow2Helper::create_disk(destination, BASE_IMAGE_SIZE_GB)?;
        Ok(())
    }
}

// ============================================================================
// EDITOR
// ============================================================================

/// One call made on a [`RecordingEditor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorCall {
    Run { image: PathBuf, script: String },
    Write { image: PathBuf, path: String, content: String },
}

impl EditorCall {
    pub fn image(&self) -> &Path {
        match self {
            EditorCall::Run { image, .. } | EditorCall::Write { image, .. } => image,
        }
    }
}

/// Guest editor that only records what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingEditor {
    calls: Mutex<Vec<EditorCall>>,
    fail_on: Option<String>,
}

impl RecordingEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// An editor whose `run` fails for scripts containing `needle`.
    pub fn failing_on(needle: impl Into<String>) -> Self {
        Self {
            fail_on: Some(needle.into()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<EditorCall> {
        self.calls.lock().clone()
    }

    /// Scripts passed to `run`, in order.
    pub fn scripts(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                EditorCall::Run { script, .. } => Some(script.clone()),
                EditorCall::Write { .. } => None,
            })
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl GuestEditor for RecordingEditor {
    async fn run(&self, image: &Path, script: &str) -> VockerResult<()> {
        self.calls.lock().push(EditorCall::Run {
            image: image.to_path_buf(),
            script: script.to_string(),
        });

        match &self.fail_on {
            Some(needle) if script.contains(needle.as_str()) => Err(VockerError::GuestAccess(
                format!("command failed in guest: {}", script),
            )),
            _ => Ok(()),
        }
    }

    async fn write_file(&self, image: &Path, guest_path: &str, content: &str) -> VockerResult<()> {
        self.calls.lock().push(EditorCall::Write {
            image: image.to_path_buf(),
            path: guest_path.to_string(),
            content: content.to_string(),
        });
        Ok(())
    }
}

// ============================================================================
// TEST HOME
// ============================================================================

/// Write an executable `sh` script that appends its arguments, one line per
/// call, to `log` and exits with `status`.
///
/// Stands in for external tools such as qemu-img.
pub fn recording_tool(dir: &Path, name: &str, log: &Path, status: i32) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    let script = format!(
        "#!/bin/sh\necho \"$@\" >> '{}'\nexit {}\n",
        log.display(),
        status
    );
    std::fs::write(&path, script).expect("Failed to write tool script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("Failed to make tool script executable");
    path
}

/// A throwaway vocker home with recording collaborators.
pub struct TestHome {
    pub dir: TempDir,
    pub fetcher: Arc<RecordingFetcher>,
    pub editor: Arc<RecordingEditor>,
}

impl TestHome {
    pub fn new() -> Self {
        Self::with_fakes(RecordingFetcher::new(), RecordingEditor::new())
    }

    pub fn with_fakes(fetcher: RecordingFetcher, editor: RecordingEditor) -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp home"),
            fetcher: Arc::new(fetcher),
            editor: Arc::new(editor),
        }
    }

    pub fn home_dir(&self) -> PathBuf {
        self.dir.path().join("vocker")
    }

    /// Options for a runtime on this home.
    pub fn options(&self) -> VockerOptions {
        VockerOptions::with_home(self.home_dir())
    }

    /// A runtime on this home. Every runtime shares the same fakes.
    pub fn runtime(&self) -> VockerRuntime {
        self.runtime_with_options(self.options())
    }

    /// A runtime on this home using a different editor.
    pub fn runtime_with_editor(&self, editor: Arc<RecordingEditor>) -> VockerRuntime {
        VockerRuntime::with_collaborators(self.options(), self.fetcher.clone(), editor)
            .expect("Failed to create test runtime")
    }

    /// A runtime with the shared fakes and custom options.
    pub fn runtime_with_options(&self, options: VockerOptions) -> VockerRuntime {
        VockerRuntime::with_collaborators(options, self.fetcher.clone(), self.editor.clone())
            .expect("Failed to create test runtime")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.home_dir().join("images")
    }
}

impl Default for TestHome {
    fn default() -> Self {
        Self::new()
    }
}
