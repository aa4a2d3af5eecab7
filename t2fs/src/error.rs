//! Error kinds surfaced by the core (`spec.md` §7).

use std::io;
use thiserror::Error;

/// Errors produced by the T2FS core.
///
/// No operation recovers internally except [`crate::format::create_root_folder`],
/// which reverts the inode-bitmap bit it set if the matching data-bitmap
/// write subsequently fails. Every other error short-circuits the
/// enclosing public call.
#[derive(Debug, Error)]
pub enum T2fsError {
	/// An underlying sector read or write failed.
	#[error("I/O error: {0}")]
	Io(#[from] io::Error),

	/// A bitmap search found no free bit during allocation.
	#[error("no space left on device")]
	NoSpace,

	/// An operation that requires a mounted partition was invoked before
	/// `mount`.
	#[error("no partition is mounted")]
	NotMounted,

	/// A directory operation was invoked before `opendir`.
	#[error("root directory is not open")]
	RootNotOpened,

	/// The handle is out of range or refers to a closed slot.
	#[error("invalid file handle {0}")]
	InvalidHandle(usize),

	/// Lookup-by-name found no matching live record.
	#[error("file not found: {0}")]
	NotFound(String),

	/// `createRootFolder` was called on a partition whose inode bitmap is
	/// non-empty.
	#[error("partition is already formatted")]
	AlreadyFormatted,

	/// The block number requested for resolution exceeds `blocksFileSize`.
	#[error("block {block} is out of range (file has {blocks_file_size} blocks)")]
	OutOfRange {
		block: u32,
		blocks_file_size: u32,
	},

	/// The superblock's signature or checksum does not match what `format`
	/// would have written; the partition does not hold a valid T2FS volume.
	#[error("invalid or corrupt superblock")]
	InvalidSuperblock,

	/// The open-file table is full (capacity `MAX_OPEN_FILES`).
	#[error("too many open files")]
	TooManyOpenFiles,

	/// `create` was called with a name that already exists in the root
	/// directory.
	#[error("file already exists: {0}")]
	AlreadyExists(String),

	/// The partition index named does not exist in the MBR.
	#[error("invalid partition index {0}")]
	InvalidPartition(usize),
}

/// Convenience alias used throughout the core.
pub type Result<T> = std::result::Result<T, T2fsError>;
