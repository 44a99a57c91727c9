//! Layered image builds.
//!
//! A build script is parsed into [`Operation`]s which a [`BuildContext`]
//! applies one by one to a linear chain of qcow2 [`Layer`]s. Layers are named
//! by [`fingerprint`] over their parent and operation, so an unchanged prefix
//! of a script maps onto images that already exist.

mod context;
mod env;
mod fingerprint;
mod layer;
mod metadata;
mod operation;
mod parser;

pub use context::{BuildContext, BuildStats, PlannedLayer, validate};
pub use env::BuildEnv;
pub use fingerprint::fingerprint;
pub use layer::{Layer, validate_layer_name, validate_tag_name};
pub use metadata::LayerMetadata;
pub use operation::{Operation, base_image_name};
pub use parser::{ParseError, Parsed, parse, parse_file};
