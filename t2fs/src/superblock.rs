//! The superblock (`spec.md` §3) and the pure-arithmetic partition
//! geometry derived from it (`spec.md` §4.1).

use crate::device::zeroed_sector;
use crate::device::BlockDevice;
use crate::error::Result;
use crate::error::T2fsError;
use crate::mbr::Partition;
use crate::SECTOR_SIZE;

/// The superblock's `id` field.
pub const SUPERBLOCK_ID: [u8; 4] = *b"T2FS";
/// The superblock's `version` field.
pub const SUPERBLOCK_VERSION: u16 = 0x7E32;

/// Per-partition geometry parameters, materialized on mount.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Superblock {
	pub version: u16,
	pub superblock_size: u16,
	pub free_blocks_bitmap_size: u16,
	pub free_inode_bitmap_size: u16,
	pub inode_area_size: u16,
	pub block_size: u16,
	pub disk_size: u32,
	pub checksum: u32,
}

impl Superblock {
	/// Computes the checksum over a superblock: the bitwise-NOT of the sum
	/// of its first five 32-bit little-endian words, read byte-exactly (not
	/// as a strided struct pointer walk — `spec.md` §9).
	pub fn compute_checksum(&self) -> u32 {
		let bytes = self.to_bytes_unchecked();
		let mut sum: u32 = 0;
		for word in bytes[0..20].chunks_exact(4) {
			sum = sum.wrapping_add(u32::from_le_bytes(word.try_into().unwrap()));
		}
		!sum
	}

	/// Serializes the superblock without touching the checksum field.
	fn to_bytes_unchecked(&self) -> [u8; SECTOR_SIZE] {
		let mut buf = zeroed_sector();
		buf[0..4].copy_from_slice(&SUPERBLOCK_ID);
		buf[4..6].copy_from_slice(&self.version.to_le_bytes());
		buf[6..8].copy_from_slice(&self.superblock_size.to_le_bytes());
		buf[8..10].copy_from_slice(&self.free_blocks_bitmap_size.to_le_bytes());
		buf[10..12].copy_from_slice(&self.free_inode_bitmap_size.to_le_bytes());
		buf[12..14].copy_from_slice(&self.inode_area_size.to_le_bytes());
		buf[14..16].copy_from_slice(&self.block_size.to_le_bytes());
		buf[16..20].copy_from_slice(&self.disk_size.to_le_bytes());
		buf
	}

	/// Serializes the superblock, computing and embedding its checksum.
	pub fn to_bytes(&self) -> [u8; SECTOR_SIZE] {
		let mut buf = self.to_bytes_unchecked();
		buf[20..24].copy_from_slice(&self.compute_checksum().to_le_bytes());
		buf
	}

	/// Parses a superblock out of a raw sector, verifying the `id` tag and
	/// checksum.
	pub fn from_bytes(buf: &[u8; SECTOR_SIZE]) -> Result<Self> {
		if buf[0..4] != SUPERBLOCK_ID {
			return Err(T2fsError::InvalidSuperblock);
		}
		let sb = Self {
			version: u16::from_le_bytes([buf[4], buf[5]]),
			superblock_size: u16::from_le_bytes([buf[6], buf[7]]),
			free_blocks_bitmap_size: u16::from_le_bytes([buf[8], buf[9]]),
			free_inode_bitmap_size: u16::from_le_bytes([buf[10], buf[11]]),
			inode_area_size: u16::from_le_bytes([buf[12], buf[13]]),
			block_size: u16::from_le_bytes([buf[14], buf[15]]),
			disk_size: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
			checksum: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
		};
		if sb.checksum != sb.compute_checksum() {
			return Err(T2fsError::InvalidSuperblock);
		}
		Ok(sb)
	}

	/// Reads the superblock from the first sector of `partition`.
	pub fn read(dev: &mut impl BlockDevice, partition: &Partition) -> Result<Self> {
		let mut buf = zeroed_sector();
		dev.read_sector(partition.first_sector, &mut buf)?;
		Self::from_bytes(&buf)
	}

	/// The size of a block in sectors.
	pub fn block_size_sectors(&self) -> u32 {
		self.block_size as u32
	}

	/// The number of blocks in the partition.
	pub fn block_quantity(&self) -> u32 {
		self.disk_size
	}
}

/// The absolute first sector of each region of a mounted partition
/// (`spec.md` §4.1). All geometry is pure arithmetic over the superblock;
/// nothing here is cached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
	pub block_bitmap_start: u32,
	pub inode_bitmap_start: u32,
	pub inode_table_start: u32,
	pub data_area_start: u32,
}

impl Geometry {
	/// Derives the geometry of `partition` given its `superblock`.
	pub fn new(partition: &Partition, sb: &Superblock) -> Self {
		let block_bitmap_start =
			partition.first_sector + sb.superblock_size as u32 * sb.block_size as u32;
		let inode_bitmap_start =
			block_bitmap_start + sb.free_blocks_bitmap_size as u32 * sb.block_size as u32;
		let inode_table_start =
			inode_bitmap_start + sb.free_inode_bitmap_size as u32 * sb.block_size as u32;
		let data_area_start = inode_table_start + sb.inode_area_size as u32 * sb.block_size as u32;

		Self {
			block_bitmap_start,
			inode_bitmap_start,
			inode_table_start,
			data_area_start,
		}
	}
}

/// Computes the format-time geometry parameters from a partition size and
/// the requested block size (`spec.md` §3's invariants and §4.2).
pub struct FormatParams {
	pub block_quantity: u32,
	pub inode_area_blocks: u32,
	pub inode_count: u32,
	/// Size in blocks of both the inode bitmap and the block bitmap
	/// (`spec.md` §3: `freeInodeBitmapSize = freeBlocksBitmapSize`, both
	/// derived from `inodeCount`).
	pub bitmap_blocks: u32,
}

impl FormatParams {
	/// Computes format-time sizing for a partition of `sectors_per_partition`
	/// sectors, using `sectors_per_block` sectors per block. `block_quantity`
	/// covers the whole partition, superblock and bitmaps and inode table
	/// included, per `spec.md` §3.
	pub fn compute(sectors_per_partition: u32, sectors_per_block: u16) -> Self {
		let block_quantity = sectors_per_partition / sectors_per_block as u32;
		let inode_area_blocks = utils::util::ceil_division(block_quantity as u64, 10) as u32;
		let inode_count = (inode_area_blocks as u64 * sectors_per_block as u64 * SECTOR_SIZE as u64
			/ 32) as u32;
		let block_bytes = sectors_per_block as u64 * SECTOR_SIZE as u64;

		let inode_bitmap_bytes = utils::util::ceil_division(inode_count as u64, 8);
		let bitmap_blocks = utils::util::ceil_division(inode_bitmap_bytes, block_bytes) as u32;

		Self {
			block_quantity,
			inode_area_blocks,
			inode_count,
			bitmap_blocks,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn sample() -> Superblock {
		let mut sb = Superblock {
			version: SUPERBLOCK_VERSION,
			superblock_size: 1,
			free_blocks_bitmap_size: 1,
			free_inode_bitmap_size: 1,
			inode_area_size: 3,
			block_size: 4,
			disk_size: 1000,
			checksum: 0,
		};
		sb.checksum = sb.compute_checksum();
		sb
	}

	#[test]
	fn checksum_roundtrip() {
		let sb = sample();
		let bytes = sb.to_bytes();
		let back = Superblock::from_bytes(&bytes).unwrap();
		assert_eq!(back, sb);
	}

	#[test]
	fn rejects_bad_signature() {
		let mut buf = zeroed_sector();
		buf[0..4].copy_from_slice(b"NOPE");
		assert!(Superblock::from_bytes(&buf).is_err());
	}

	#[test]
	fn rejects_bad_checksum() {
		let sb = sample();
		let mut bytes = sb.to_bytes();
		bytes[20] ^= 0xff;
		assert!(Superblock::from_bytes(&bytes).is_err());
	}

	#[test]
	fn geometry_is_contiguous_and_block_aligned() {
		let sb = sample();
		let partition = Partition {
			first_sector: 100,
			last_sector: 100 + sb.disk_size * sb.block_size as u32 - 1,
		};
		let geom = Geometry::new(&partition, &sb);
		assert_eq!(geom.block_bitmap_start, 100 + 1 * 4);
		assert_eq!(geom.inode_bitmap_start, geom.block_bitmap_start + 1 * 4);
		assert_eq!(geom.inode_table_start, geom.inode_bitmap_start + 1 * 4);
		assert_eq!(geom.data_area_start, geom.inode_table_start + 3 * 4);

		let last_block_end = geom.data_area_start
			+ (sb.disk_size - sb.superblock_size as u32 - sb.free_blocks_bitmap_size as u32
				- sb.free_inode_bitmap_size as u32
				- sb.inode_area_size as u32)
				* sb.block_size as u32;
		assert_eq!(last_block_end, partition.last_sector + 1);
	}
}
