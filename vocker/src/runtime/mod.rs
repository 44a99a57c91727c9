pub mod constants;
pub mod layout;
pub(crate) mod lock;
pub mod options;

mod core;
pub use core::{BuildOutcome, BuildPlan, VockerRuntime};
