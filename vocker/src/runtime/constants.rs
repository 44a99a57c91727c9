//! Constants for the vocker runtime
//!
//! Centralized location for hardcoded guest paths and external program names.

pub use vocker_shared::constants::{envs, layer_files};

/// Paths inside the guest filesystem touched by build operations.
pub mod guest_paths {
    /// Startup script installed by CMD
    pub const RC_LOCAL: &str = "/etc/rc.d/rc.local";

    /// Getty units patched for root autologin
    pub const GETTY_UNITS: &[&str] = &[
        "/usr/lib/systemd/system/getty@.service",
        "/usr/lib/systemd/system/serial-getty@.service",
    ];

    /// Bootloader config patched for a quiet, fast boot
    pub const GRUB_CFG: &str = "/boot/grub2/grub.cfg";

    /// SELinux mode config
    pub const SELINUX_CONFIG: &str = "/etc/sysconfig/selinux";
}

/// Default external program names, resolved through PATH.
pub mod tools {
    pub const VIRT_BUILDER: &str = "virt-builder";
    pub const GUESTFISH: &str = "guestfish";
    pub const QEMU_IMG: &str = "qemu-img";
}
