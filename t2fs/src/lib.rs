//! A from-scratch implementation of the T2FS on-disk format: a flat,
//! single-directory filesystem laid out over a partitioned block device.
//!
//! The crate is organized the way the on-disk format itself is layered:
//! [`mbr`] (partition table) → [`superblock`] (per-partition geometry) →
//! [`bitmap`] (free-space tracking) → [`inode`] (block-pointer resolution)
//! → [`directory`] (the flat root directory) → [`file`] (cursor-driven
//! read/write), all tied together by [`context::FileSystem`].

pub mod bitmap;
pub mod context;
pub mod device;
pub mod directory;
pub mod error;
pub mod file;
pub mod format;
pub mod inode;
pub mod mbr;
pub mod superblock;

/// The size in bytes of one sector; the unit every on-disk offset is
/// expressed in.
pub const SECTOR_SIZE: usize = 256;

/// The sector holding the MBR.
pub const MBR_SECTOR: u32 = 0;

/// The maximum number of simultaneously open file handles.
pub const MAX_OPEN_FILES: usize = 10;

pub use context::FileSystem;
pub use device::BlockDevice;
pub use device::FileDevice;
pub use error::Result;
pub use error::T2fsError;
pub use file::SEEK_TO_END;
