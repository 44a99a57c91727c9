//! Disk image operations.
//!
//! This module provides the storage medium primitives for layers:
//! - `Disk` - RAII wrapper for disk image files
//! - `DiskFormat` - Disk format types (Raw, Qcow2)
//! - `Qcow2Helper` - QCOW2 copy-on-write disk creation and header inspection

pub mod constants;
mod image;
mod qcow2;

pub use image::{Disk, DiskFormat};
pub use qcow2::Qcow2Helper;
