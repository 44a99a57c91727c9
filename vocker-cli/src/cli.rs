use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use vocker::{VockerOptions, VockerRuntime};

use crate::commands::{build::BuildArgs, export::ExportArgs, images::ImagesArgs};

/// Build cached qcow2 VM images from Dockerfile-style scripts.
#[derive(Parser, Debug)]
#[command(name = "vocker", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalFlags,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build an image from a script
    Build(BuildArgs),
    /// Flatten an image into a standalone disk file
    Export(ExportArgs),
    /// List cached layers
    Images(ImagesArgs),
}

#[derive(Args, Debug)]
pub struct GlobalFlags {
    /// Home directory holding the layer cache [default: $VOCKER_HOME or ~/.cache/vocker]
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    pub debug: bool,
}

impl GlobalFlags {
    pub fn options(&self) -> anyhow::Result<VockerOptions> {
        let mut options = VockerOptions::default();
        if let Some(home) = &self.home {
            options.home_dir = home.clone();
        }
        options.home_dir = std::path::absolute(&options.home_dir)?;
        Ok(options)
    }

    pub fn create_runtime(&self) -> anyhow::Result<VockerRuntime> {
        Ok(VockerRuntime::new(self.options()?)?)
    }

    pub fn log_level(&self) -> &'static str {
        if self.debug { "debug" } else { "info" }
    }
}
