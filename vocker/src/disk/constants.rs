//! Storage and disk image constants.

/// QCOW2 disk image configuration
pub mod qcow2 {
    /// QCOW2 cluster size in bits (64KB = 2^16)
    pub const CLUSTER_BITS: usize = 16;

    /// QCOW2 refcount order (16-bit refcounts = 2^4)
    pub const REFCOUNT_ORDER: u8 = 4;

    /// Block size for QCOW2 formatting (512 bytes)
    pub const BLOCK_SIZE: usize = 512;

    /// "QFI\xfb"
    pub const MAGIC: u32 = 0x514649fb;

    /// Size of the fixed v3 header
    pub const HEADER_LENGTH: usize = 104;

    /// Offset at which COW children store their backing file path
    pub const BACKING_FILE_OFFSET: u64 = 512;

    /// Header extension type carrying the backing file format
    pub const BACKING_FORMAT_EXTENSION: u32 = 0xE2792ACA;
}
