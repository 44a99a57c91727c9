//! Vocker - build cached qcow2 VM images from Dockerfile-style scripts.
//!
//! Every script directive produces one copy-on-write layer on top of the
//! previous one. Layers are named by a hash over the operation history, so
//! rebuilding a script only redoes the steps after the first change.
//!
//! ```no_run
//! use vocker::{BuildOptions, VockerRuntime};
//!
//! # async fn example() -> vocker::VockerResult<()> {
//! let runtime = VockerRuntime::with_defaults()?;
//! let outcome = runtime
//!     .build("FROM fedora:23\nRUN dnf -y install nginx\n", &BuildOptions::default())
//!     .await?;
//! println!("{}", outcome.identity());
//! # Ok(())
//! # }
//! ```

pub mod build;
pub mod disk;
pub mod guest;
pub mod runtime;
pub mod util;

pub use build::{LayerMetadata, Operation, ParseError};
pub use disk::DiskFormat;
pub use runtime::options::{BuildOptions, ToolOptions, VockerOptions};
pub use runtime::{BuildOutcome, BuildPlan, VockerRuntime};
pub use vocker_shared::errors::{VockerError, VockerResult};
