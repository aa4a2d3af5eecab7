//! The root directory (`spec.md` §4.6): a flat array of fixed-size records
//! stored as the byte stream of inode 0, with no subdirectories.

use crate::error::Result;
use crate::error::T2fsError;
use crate::inode::Inode;
use crate::superblock::Geometry;
use crate::superblock::Superblock;
use crate::BlockDevice;
use crate::SECTOR_SIZE;

/// The maximum length of a record's name, in bytes.
pub const RECORD_NAME_LEN: usize = 59;
/// The size in bytes of one on-disk directory record.
pub const RECORD_SIZE: usize = 72;

/// A record's `TypeVal`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordType {
	Invalid,
	RegularFile,
}

impl RecordType {
	fn from_byte(b: u8) -> Self {
		match b {
			1 => Self::RegularFile,
			_ => Self::Invalid,
		}
	}

	fn to_byte(self) -> u8 {
		match self {
			Self::Invalid => 0,
			Self::RegularFile => 1,
		}
	}
}

/// A single 72-byte root directory record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirectoryRecord {
	pub kind: RecordType,
	pub name: [u8; RECORD_NAME_LEN],
	pub blocks_file_size: u32,
	pub bytes_file_size: u32,
	pub inode_number: u32,
}

impl DirectoryRecord {
	/// An empty, invalid record, as written into a freshly grown directory
	/// block.
	pub fn empty() -> Self {
		Self {
			kind: RecordType::Invalid,
			name: [0; RECORD_NAME_LEN],
			blocks_file_size: 0,
			bytes_file_size: 0,
			inode_number: 0,
		}
	}

	/// Builds a record naming a new regular file.
	pub fn new(name: &str, inode_number: u32) -> Self {
		let mut buf = [0u8; RECORD_NAME_LEN];
		let bytes = name.as_bytes();
		let len = bytes.len().min(RECORD_NAME_LEN);
		buf[..len].copy_from_slice(&bytes[..len]);
		Self {
			kind: RecordType::RegularFile,
			name: buf,
			blocks_file_size: 0,
			bytes_file_size: 0,
			inode_number,
		}
	}

	/// Whether this slot names a live file.
	pub fn is_valid(&self) -> bool {
		self.kind != RecordType::Invalid
	}

	/// The record's name, trimmed at its first NUL byte.
	pub fn name_str(&self) -> String {
		let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
		String::from_utf8_lossy(&self.name[..end]).into_owned()
	}

	fn to_bytes(self) -> [u8; RECORD_SIZE] {
		let mut buf = [0u8; RECORD_SIZE];
		buf[0] = self.kind.to_byte();
		buf[1..1 + RECORD_NAME_LEN].copy_from_slice(&self.name);
		let off = 1 + RECORD_NAME_LEN;
		buf[off..off + 4].copy_from_slice(&self.blocks_file_size.to_le_bytes());
		buf[off + 4..off + 8].copy_from_slice(&self.bytes_file_size.to_le_bytes());
		buf[off + 8..off + 12].copy_from_slice(&self.inode_number.to_le_bytes());
		buf
	}

	fn from_bytes(buf: &[u8; RECORD_SIZE]) -> Self {
		let off = 1 + RECORD_NAME_LEN;
		Self {
			kind: RecordType::from_byte(buf[0]),
			name: buf[1..off].try_into().unwrap(),
			blocks_file_size: u32::from_le_bytes(buf[off..off + 4].try_into().unwrap()),
			bytes_file_size: u32::from_le_bytes(buf[off + 4..off + 8].try_into().unwrap()),
			inode_number: u32::from_le_bytes(buf[off + 8..off + 12].try_into().unwrap()),
		}
	}
}

/// Reads the byte range `[offset, offset + RECORD_SIZE)` of the root
/// directory's data stream (inode 0), spanning sector boundaries as
/// necessary.
fn read_range(
	dev: &mut impl BlockDevice,
	sb: &Superblock,
	geometry: &Geometry,
	root: &Inode,
	offset: u32,
) -> Result<[u8; RECORD_SIZE]> {
	let mut out = [0u8; RECORD_SIZE];
	let mut filled = 0usize;
	while filled < RECORD_SIZE {
		let pos = offset as usize + filled;
		let block = pos as u32 / (sb.block_size_sectors() * SECTOR_SIZE as u32);
		let byte_in_block = pos as u32 % (sb.block_size_sectors() * SECTOR_SIZE as u32);
		let sector_in_block = byte_in_block / SECTOR_SIZE as u32;
		let byte_in_sector = (byte_in_block % SECTOR_SIZE as u32) as usize;

		let sector = root.resolve(sb, geometry, dev, block, sector_in_block)?;
		let mut buf = crate::device::zeroed_sector();
		dev.read_sector(sector, &mut buf)?;

		let take = (SECTOR_SIZE - byte_in_sector).min(RECORD_SIZE - filled);
		out[filled..filled + take].copy_from_slice(&buf[byte_in_sector..byte_in_sector + take]);
		filled += take;
	}
	Ok(out)
}

/// Writes `record` at byte offset `offset` of the root directory's data
/// stream, spanning sector boundaries as necessary. `offset + RECORD_SIZE`
/// must not exceed the space backed by `root`'s currently allocated blocks.
fn write_range(
	dev: &mut impl BlockDevice,
	sb: &Superblock,
	geometry: &Geometry,
	root: &Inode,
	offset: u32,
	record: [u8; RECORD_SIZE],
) -> Result<()> {
	let mut written = 0usize;
	while written < RECORD_SIZE {
		let pos = offset as usize + written;
		let block = pos as u32 / (sb.block_size_sectors() * SECTOR_SIZE as u32);
		let byte_in_block = pos as u32 % (sb.block_size_sectors() * SECTOR_SIZE as u32);
		let sector_in_block = byte_in_block / SECTOR_SIZE as u32;
		let byte_in_sector = (byte_in_block % SECTOR_SIZE as u32) as usize;

		let sector = root.resolve(sb, geometry, dev, block, sector_in_block)?;
		let mut buf = crate::device::zeroed_sector();
		dev.read_sector(sector, &mut buf)?;

		let take = (SECTOR_SIZE - byte_in_sector).min(RECORD_SIZE - written);
		buf[byte_in_sector..byte_in_sector + take].copy_from_slice(&record[written..written + take]);
		dev.write_sector(sector, &buf)?;
		written += take;
	}
	Ok(())
}

/// The number of 72-byte record slots backed by `root`'s currently
/// allocated blocks.
fn capacity(sb: &Superblock, root: &Inode) -> u32 {
	(root.blocks_file_size * sb.block_size_sectors() * SECTOR_SIZE as u32) / RECORD_SIZE as u32
}

/// Reads the record at slot `index`. `index` must be within `capacity`.
pub fn record_by_index(
	dev: &mut impl BlockDevice,
	sb: &Superblock,
	geometry: &Geometry,
	root: &Inode,
	index: u32,
) -> Result<DirectoryRecord> {
	let bytes = read_range(dev, sb, geometry, root, index * RECORD_SIZE as u32)?;
	Ok(DirectoryRecord::from_bytes(&bytes))
}

/// Writes the record at slot `index`.
pub fn write_record(
	dev: &mut impl BlockDevice,
	sb: &Superblock,
	geometry: &Geometry,
	root: &Inode,
	index: u32,
	record: DirectoryRecord,
) -> Result<()> {
	write_range(dev, sb, geometry, root, index * RECORD_SIZE as u32, record.to_bytes())
}

/// Scans every valid slot for `name`, returning its index and record.
pub fn record_by_name(
	dev: &mut impl BlockDevice,
	sb: &Superblock,
	geometry: &Geometry,
	root: &Inode,
	name: &str,
) -> Result<Option<(u32, DirectoryRecord)>> {
	for i in 0..capacity(sb, root) {
		let record = record_by_index(dev, sb, geometry, root, i)?;
		if record.is_valid() && record.name_str() == name {
			return Ok(Some((i, record)));
		}
	}
	Ok(None)
}

/// Finds the first invalid slot, or `None` if every slot currently backed by
/// `root`'s blocks is occupied.
pub fn first_free_slot(
	dev: &mut impl BlockDevice,
	sb: &Superblock,
	geometry: &Geometry,
	root: &Inode,
) -> Result<Option<u32>> {
	for i in 0..capacity(sb, root) {
		let record = record_by_index(dev, sb, geometry, root, i)?;
		if !record.is_valid() {
			return Ok(Some(i));
		}
	}
	Ok(None)
}

/// Returns `true` if no slot in the directory is occupied (used by
/// `create_root_folder` to refuse reformatting a live partition, and by
/// `format` sanity checks).
pub fn is_empty(
	dev: &mut impl BlockDevice,
	sb: &Superblock,
	geometry: &Geometry,
	root: &Inode,
) -> Result<bool> {
	for i in 0..capacity(sb, root) {
		if record_by_index(dev, sb, geometry, root, i)?.is_valid() {
			return Ok(false);
		}
	}
	Ok(true)
}

/// Inserts `record` into the first invalid slot, growing `root` by one
/// block first if every currently backed slot is occupied (`spec.md` §9's
/// resolution: prefer reusing an invalid slot over growing the directory).
/// Advances `root.bytes_file_size` to cover the written slot, the same way
/// `OpenFile::write` advances a regular file's size.
pub fn insert_record(
	dev: &mut impl BlockDevice,
	sb: &Superblock,
	geometry: &Geometry,
	bitmaps: &crate::bitmap::Bitmaps,
	root: &mut Inode,
	record: DirectoryRecord,
) -> Result<u32> {
	let slot = match first_free_slot(dev, sb, geometry, root)? {
		Some(slot) => slot,
		None => {
			let old_capacity = capacity(sb, root);
			root.grow(sb, geometry, bitmaps, dev)?;
			let new_block_bytes = sb.block_size_sectors() as usize * SECTOR_SIZE;
			for i in 0..(new_block_bytes / RECORD_SIZE) as u32 {
				write_record(dev, sb, geometry, root, old_capacity + i, DirectoryRecord::empty())?;
			}
			old_capacity
		}
	};
	write_record(dev, sb, geometry, root, slot, record)?;

	let written_through = (slot + 1) * RECORD_SIZE as u32;
	if written_through > root.bytes_file_size {
		root.bytes_file_size = written_through;
	}

	Ok(slot)
}

/// Marks the slot holding `name` as invalid, failing with
/// [`T2fsError::NotFound`] if no such record exists.
pub fn remove_record(
	dev: &mut impl BlockDevice,
	sb: &Superblock,
	geometry: &Geometry,
	root: &Inode,
	name: &str,
) -> Result<DirectoryRecord> {
	let (index, record) = record_by_name(dev, sb, geometry, root, name)?
		.ok_or_else(|| T2fsError::NotFound(name.to_owned()))?;
	write_record(dev, sb, geometry, root, index, DirectoryRecord::empty())?;
	Ok(record)
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn record_roundtrip() {
		let record = DirectoryRecord::new("hello.txt", 7);
		let bytes = record.to_bytes();
		assert_eq!(bytes.len(), RECORD_SIZE);
		let back = DirectoryRecord::from_bytes(&bytes);
		assert_eq!(back, record);
		assert_eq!(back.name_str(), "hello.txt");
		assert!(back.is_valid());
	}

	#[test]
	fn empty_record_is_invalid() {
		assert!(!DirectoryRecord::empty().is_valid());
	}

	#[test]
	fn name_longer_than_slot_is_truncated() {
		let long = "x".repeat(100);
		let record = DirectoryRecord::new(&long, 1);
		assert_eq!(record.name_str().len(), RECORD_NAME_LEN);
	}
}
