use std::ffi::OsStr;
use std::path::Path;

use async_trait::async_trait;
use vocker_shared::errors::{VockerError, VockerResult};

use super::BaseFetcher;
use crate::util::run_tool;

/// Fetches base templates with `virt-builder`.
#[derive(Debug, Clone)]
pub struct VirtBuilder {
    program: String,
}

impl VirtBuilder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl BaseFetcher for VirtBuilder {
    async fn fetch(&self, template: &str, destination: &Path) -> VockerResult<()> {
        tracing::info!(template, "Fetching new base image");

        let args = [
            OsStr::new("--format=qcow2"),
            OsStr::new("-o"),
            destination.as_os_str(),
            OsStr::new(template),
        ];

        run_tool(&self.program, args)
            .await
            .map_err(|e| {
                VockerError::Provisioning(format!("cannot fetch template '{}': {}", template, e))
            })?;

        tracing::debug!(template, destination = %destination.display(), "Fetched base image");
        Ok(())
    }
}
