//! Configuration for vocker.

use crate::runtime::constants::{envs as const_envs, tools};
use crate::runtime::layout::dirs as const_dirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Tool Options
// ============================================================================

/// External programs the collaborators shell out to.
///
/// Each entry is a program name looked up through `PATH` or an absolute path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOptions {
    /// Base template provisioning tool.
    #[serde(default = "default_virt_builder")]
    pub virt_builder: String,

    /// Guest filesystem editing tool.
    #[serde(default = "default_guestfish")]
    pub guestfish: String,

    /// Image conversion tool used to flatten layer chains on export.
    #[serde(default = "default_qemu_img")]
    pub qemu_img: String,
}

fn default_virt_builder() -> String {
    env_or(const_envs::VOCKER_VIRT_BUILDER, tools::VIRT_BUILDER)
}

fn default_guestfish() -> String {
    env_or(const_envs::VOCKER_GUESTFISH, tools::GUESTFISH)
}

fn default_qemu_img() -> String {
    env_or(const_envs::VOCKER_QEMU_IMG, tools::QEMU_IMG)
}

fn env_or(var: &str, fallback: &str) -> String {
    std::env::var(var)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

impl Default for ToolOptions {
    fn default() -> Self {
        Self {
            virt_builder: default_virt_builder(),
            guestfish: default_guestfish(),
            qemu_img: default_qemu_img(),
        }
    }
}

// ============================================================================
// Runtime Options
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VockerOptions {
    /// Root of the layer cache, locks and logs.
    pub home_dir: PathBuf,
    #[serde(default)]
    pub tools: ToolOptions,
}

impl VockerOptions {
    /// Options rooted at `home_dir`, tools from the environment.
    pub fn with_home(home_dir: PathBuf) -> Self {
        Self {
            home_dir,
            tools: ToolOptions::default(),
        }
    }
}

impl Default for VockerOptions {
    fn default() -> Self {
        let home_dir = std::env::var(const_envs::VOCKER_HOME)
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let mut path = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
                path.push(const_dirs::VOCKER_DIR);
                path
            });

        Self::with_home(home_dir)
    }
}

// ============================================================================
// Build Options
// ============================================================================

/// Per-build settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Recreate every derived layer and reapply its operation even when a
    /// cached artifact exists. Base images are never refetched.
    #[serde(default)]
    pub force_rebuild: bool,

    /// Name one more layer derived from the result, for stable addressing.
    #[serde(default)]
    pub tag: Option<String>,
}
