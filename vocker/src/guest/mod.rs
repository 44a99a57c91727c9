//! External collaborators that touch guest images.
//!
//! The build pipeline never edits an image itself. Base templates come from a
//! [`BaseFetcher`], and every in-guest mutation goes through a
//! [`GuestEditor`]. Both are traits so the pipeline can be driven by
//! recording fakes in tests.

mod guestfish;
mod virt_builder;

use std::path::Path;

use async_trait::async_trait;
use vocker_shared::errors::VockerResult;

pub use guestfish::Guestfish;
pub use virt_builder::VirtBuilder;

/// Populates a file with a base image built from a named template.
#[async_trait]
pub trait BaseFetcher: Send + Sync {
    /// Write a qcow2 image for `template` to `destination`.
    ///
    /// Fails with `VockerError::Provisioning` on unknown templates or
    /// network/storage failures.
    async fn fetch(&self, template: &str, destination: &Path) -> VockerResult<()>;
}

/// One step of a guest edit batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuestCommand {
    /// Run a shell script inside the guest.
    Sh(String),
    /// Write `content` to `path` inside the guest.
    Write { path: String, content: String },
}

/// Mutates the filesystem of a guest image in place.
///
/// All methods fail with `VockerError::GuestAccess` when the image cannot be
/// opened or a command inside the guest fails.
#[async_trait]
pub trait GuestEditor: Send + Sync {
    /// Execute `script` with `sh` inside the guest rooted at `image`.
    async fn run(&self, image: &Path, script: &str) -> VockerResult<()>;

    /// Write a file into the guest filesystem.
    async fn write_file(&self, image: &Path, guest_path: &str, content: &str) -> VockerResult<()>;

    /// Apply several commands in order, stopping at the first failure.
    ///
    /// Implementations that pay a per-invocation cost should override this
    /// to open the image once.
    async fn batch(&self, image: &Path, commands: &[GuestCommand]) -> VockerResult<()> {
        for command in commands {
            match command {
                GuestCommand::Sh(script) => self.run(image, script).await?,
                GuestCommand::Write { path, content } => {
                    self.write_file(image, path, content).await?
                }
            }
        }
        Ok(())
    }
}
