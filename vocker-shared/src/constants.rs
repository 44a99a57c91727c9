//! Shared constants between the build library and the command line.
//!
//! Environment variable names and on-disk naming must be identical on both
//! sides, otherwise the CLI would look for layers where the library never
//! writes them.

/// Environment variables read at startup
pub mod envs {
    /// Overrides the home directory (default: `<cache dir>/vocker`)
    pub const VOCKER_HOME: &str = "VOCKER_HOME";

    /// Program used to fetch base templates
    pub const VOCKER_VIRT_BUILDER: &str = "VOCKER_VIRT_BUILDER";

    /// Program used to edit guest filesystems
    pub const VOCKER_GUESTFISH: &str = "VOCKER_GUESTFISH";

    /// Program used to flatten layer chains
    pub const VOCKER_QEMU_IMG: &str = "VOCKER_QEMU_IMG";
}

/// Layer file naming
pub mod layer_files {
    /// Extension of every layer image file
    pub const IMAGE_EXTENSION: &str = "qcow2";

    /// Extension of the metadata sidecar written next to each built layer
    pub const METADATA_EXTENSION: &str = "json";

    /// Extension of per-layer lock files
    pub const LOCK_EXTENSION: &str = "lock";
}

/// Default build script name, as with `docker build`
pub const DEFAULT_BUILD_FILE: &str = "Dockerfile";
