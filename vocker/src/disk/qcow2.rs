//! Qcow2 disk image management.
//!
//! Creates qcow2 images for layers and inspects their headers. Derived layers
//! are COW children whose backing file is the parent layer's image; base disks
//! are plain qcow2 images.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use qcow2_rs::meta::Qcow2Header;
use vocker_shared::errors::{VockerError, VockerResult};

use super::constants::qcow2::{
    BACKING_FILE_OFFSET, BACKING_FORMAT_EXTENSION, BLOCK_SIZE, CLUSTER_BITS, HEADER_LENGTH, MAGIC,
    REFCOUNT_ORDER,
};
use super::{Disk, DiskFormat};

/// Parsed qcow2 header information.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Qcow2HeaderInfo {
    version: u32,
    size: u64,
    backing_file_offset: u64,
    backing_file_size: u32,
}

/// Helper for qcow2 disk operations.
pub struct Qcow2Helper;

impl Qcow2Helper {
    /// Create an empty qcow2 disk image at the specified path (native, qcow2-rs).
    ///
    /// The disk is sparse. An existing file is reused as is. The returned disk
    /// is kept: base disks are never removed on drop.
    pub fn create_disk(disk_path: &Path, size_gb: u64) -> VockerResult<Disk> {
        ensure_parent_dir(disk_path)?;

        if disk_path.exists() {
            tracing::debug!("Disk already exists: {}", disk_path.display());
            return Ok(Disk::kept(disk_path.to_path_buf(), DiskFormat::Qcow2));
        }

        tracing::info!(
            "Creating qcow2 disk: {} ({}GB sparse)",
            disk_path.display(),
            size_gb
        );

        let size_bytes = size_gb * 1024 * 1024 * 1024;

        let (rc_table, rc_block, _l1_table) = Qcow2Header::calculate_meta_params(
            size_bytes,
            CLUSTER_BITS,
            REFCOUNT_ORDER,
            BLOCK_SIZE,
        );
        let clusters = 1 + rc_table.1 + rc_block.1;
        let buffer_size = ((clusters as usize) << CLUSTER_BITS) + BLOCK_SIZE;

        let mut header_buf = vec![0u8; buffer_size];
        Qcow2Header::format_qcow2(
            &mut header_buf,
            size_bytes,
            CLUSTER_BITS,
            REFCOUNT_ORDER,
            BLOCK_SIZE,
        )
        .map_err(|e| {
            VockerError::Storage(format!(
                "Failed to format qcow2 header for disk {}: {}",
                disk_path.display(),
                e
            ))
        })?;

        write_new_file(disk_path, &header_buf)?;

        tracing::info!("Created qcow2 disk: {}", disk_path.display());
        Ok(Disk::kept(disk_path.to_path_buf(), DiskFormat::Qcow2))
    }

    /// Create a COW child disk backed by `base_disk`.
    ///
    /// Reads come from the base, writes go to the child. Any file already at
    /// `child_path` is replaced: callers decide beforehand whether an existing
    /// child may be reused.
    ///
    /// # Returns
    /// Owned disk, removed on drop until released
    pub fn create_cow_child_disk(
        base_disk: &Path,
        backing_format: DiskFormat,
        child_path: &Path,
        virtual_size: u64,
    ) -> VockerResult<Disk> {
        ensure_parent_dir(child_path)?;

        tracing::debug!(
            "Creating COW child disk: {} (backing: {}, format: {})",
            child_path.display(),
            base_disk.display(),
            backing_format.as_str()
        );

        // Guard first so a half-written header is removed on error
        let disk = Disk::owned(child_path.to_path_buf(), DiskFormat::Qcow2);
        Self::write_cow_child_header(child_path, base_disk, backing_format, virtual_size)?;

        Ok(disk)
    }

    /// Get the virtual size of a qcow2 disk image.
    pub fn virtual_size(path: &Path) -> VockerResult<u64> {
        let mut file = open(path)?;
        Ok(read_header(&mut file, path)?.size)
    }

    /// Get the backing file recorded in a qcow2 image, if any.
    pub fn backing_file(path: &Path) -> VockerResult<Option<PathBuf>> {
        let mut file = open(path)?;
        let header = read_header(&mut file, path)?;

        if header.backing_file_offset == 0 || header.backing_file_size == 0 {
            return Ok(None);
        }

        let mut name = vec![0u8; header.backing_file_size as usize];
        file.seek(SeekFrom::Start(header.backing_file_offset))
            .and_then(|_| file.read_exact(&mut name))
            .map_err(|e| {
                VockerError::Storage(format!(
                    "Failed to read backing file name from {}: {}",
                    path.display(),
                    e
                ))
            })?;

        let name = String::from_utf8(name).map_err(|e| {
            VockerError::Storage(format!(
                "Backing file name in {} is not UTF-8: {}",
                path.display(),
                e
            ))
        })?;

        Ok(Some(PathBuf::from(name)))
    }

    /// Write a qcow2 v3 header with backing file reference.
    ///
    /// The child starts empty: all L1 entries are zero so every read falls
    /// through to the backing file.
    fn write_cow_child_header(
        child_path: &Path,
        backing_path: &Path,
        backing_format: DiskFormat,
        virtual_size: u64,
    ) -> VockerResult<()> {
        let backing_str = backing_path
            .canonicalize()
            .map_err(|e| {
                VockerError::Storage(format!(
                    "Failed to canonicalize backing path {}: {}",
                    backing_path.display(),
                    e
                ))
            })?
            .to_string_lossy()
            .to_string();

        let backing_bytes = backing_str.as_bytes();
        let backing_len = backing_bytes.len() as u32;

        let format_bytes = backing_format.as_str().as_bytes();
        let format_len = format_bytes.len() as u32;

        // Layout: cluster 0 header + backing name, cluster 1 L1 table,
        // cluster 2 refcount table, cluster 3 refcount block.
        let cluster_bits: u32 = CLUSTER_BITS as u32;
        let cluster_size: u64 = 1u64 << cluster_bits;

        if BACKING_FILE_OFFSET + backing_len as u64 > cluster_size {
            return Err(VockerError::Storage(format!(
                "Backing path too long for qcow2 header: {}",
                backing_str
            )));
        }

        // One L1 entry maps one L2 table, which maps cluster_size / 8 clusters
        let bytes_per_l1_entry = cluster_size * (cluster_size / 8);
        let l1_size = virtual_size.div_ceil(bytes_per_l1_entry);
        if l1_size * 8 > cluster_size {
            return Err(VockerError::Storage(format!(
                "Virtual size {} too large for a single-cluster L1 table",
                virtual_size
            )));
        }
        let l1_size = l1_size as u32;
        let l1_offset = cluster_size;

        let refcount_offset = cluster_size * 2;
        let refcount_clusters = 1u32;
        let refcount_block_offset = cluster_size * 3;

        let mut header = vec![0u8; cluster_size as usize * 4];

        header[0..4].copy_from_slice(&MAGIC.to_be_bytes());
        header[4..8].copy_from_slice(&3u32.to_be_bytes());
        header[8..16].copy_from_slice(&BACKING_FILE_OFFSET.to_be_bytes());
        header[16..20].copy_from_slice(&backing_len.to_be_bytes());
        header[20..24].copy_from_slice(&cluster_bits.to_be_bytes());
        header[24..32].copy_from_slice(&virtual_size.to_be_bytes());
        // 32..36 crypt method: none
        header[36..40].copy_from_slice(&l1_size.to_be_bytes());
        header[40..48].copy_from_slice(&l1_offset.to_be_bytes());
        header[48..56].copy_from_slice(&refcount_offset.to_be_bytes());
        header[56..60].copy_from_slice(&refcount_clusters.to_be_bytes());
        // 60..96 snapshots and feature bits: all zero
        header[96..100].copy_from_slice(&(REFCOUNT_ORDER as u32).to_be_bytes());
        header[100..104].copy_from_slice(&(HEADER_LENGTH as u32).to_be_bytes());

        // Backing format extension, padded to 8 bytes, then end-of-extensions
        let ext = HEADER_LENGTH;
        header[ext..ext + 4].copy_from_slice(&BACKING_FORMAT_EXTENSION.to_be_bytes());
        header[ext + 4..ext + 8].copy_from_slice(&format_len.to_be_bytes());
        header[ext + 8..ext + 8 + format_bytes.len()].copy_from_slice(format_bytes);
        // End marker is the zeroed 8 bytes after the padded extension data

        let name_offset = BACKING_FILE_OFFSET as usize;
        header[name_offset..name_offset + backing_bytes.len()].copy_from_slice(backing_bytes);

        let rt_offset = refcount_offset as usize;
        header[rt_offset..rt_offset + 8].copy_from_slice(&refcount_block_offset.to_be_bytes());

        // 16-bit refcount of 1 for the four metadata clusters
        let rb_offset = refcount_block_offset as usize;
        for i in 0..4 {
            header[rb_offset + i * 2..rb_offset + i * 2 + 2].copy_from_slice(&1u16.to_be_bytes());
        }

        write_new_file(child_path, &header)
    }
}

fn ensure_parent_dir(path: &Path) -> VockerResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            VockerError::Storage(format!(
                "Failed to create parent directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }
    Ok(())
}

fn write_new_file(path: &Path, contents: &[u8]) -> VockerResult<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|e| {
            VockerError::Storage(format!(
                "Failed to create disk file {}: {}",
                path.display(),
                e
            ))
        })?;

    file.write_all(contents)
        .and_then(|_| file.sync_all())
        .map_err(|e| {
            VockerError::Storage(format!(
                "Failed to write qcow2 header to {}: {}",
                path.display(),
                e
            ))
        })
}

fn open(path: &Path) -> VockerResult<File> {
    File::open(path)
        .map_err(|e| VockerError::Storage(format!("Failed to open {}: {}", path.display(), e)))
}

fn read_header(file: &mut File, path: &Path) -> VockerResult<Qcow2HeaderInfo> {
    let mut header = [0u8; HEADER_LENGTH];
    file.read_exact(&mut header).map_err(|e| {
        VockerError::Storage(format!(
            "Failed to read header from {}: {}",
            path.display(),
            e
        ))
    })?;

    let magic = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    if magic != MAGIC {
        return Err(VockerError::Storage(format!(
            "Invalid qcow2 magic in {}: 0x{:08x}",
            path.display(),
            magic
        )));
    }

    let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    let backing_file_offset = u64::from_be_bytes([
        header[8], header[9], header[10], header[11], header[12], header[13], header[14],
        header[15],
    ]);
    let backing_file_size = u32::from_be_bytes([header[16], header[17], header[18], header[19]]);
    let size = u64::from_be_bytes([
        header[24], header[25], header[26], header[27], header[28], header[29], header[30],
        header[31],
    ]);

    Ok(Qcow2HeaderInfo {
        version,
        size,
        backing_file_offset,
        backing_file_size,
    })
}
