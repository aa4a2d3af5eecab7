//! Formatting and root-directory bootstrap (`spec.md` §4.2, §4.3).

use crate::bitmap::BitmapKind;
use crate::bitmap::BitmapRegion;
use crate::bitmap::Bitmaps;
use crate::device::zeroed_sector;
use crate::error::Result;
use crate::error::T2fsError;
use crate::inode::Inode;
use crate::mbr::Partition;
use crate::superblock::FormatParams;
use crate::superblock::Geometry;
use crate::superblock::Superblock;
use crate::superblock::SUPERBLOCK_VERSION;
use crate::BlockDevice;
use log::info;
use log::warn;

/// The number of blocks the superblock itself occupies.
const SUPERBLOCK_BLOCKS: u16 = 1;

/// Lays out a fresh, empty T2FS volume in `partition`: writes the
/// superblock and zeroes both bitmaps. Does not create the root directory;
/// call [`create_root_folder`] afterwards.
pub fn format(
	dev: &mut impl BlockDevice,
	partition: &Partition,
	block_size_sectors: u16,
) -> Result<Superblock> {
	let params = FormatParams::compute(partition.sectors_count(), block_size_sectors);

	let mut sb = Superblock {
		version: SUPERBLOCK_VERSION,
		superblock_size: SUPERBLOCK_BLOCKS,
		free_blocks_bitmap_size: params.bitmap_blocks as u16,
		free_inode_bitmap_size: params.bitmap_blocks as u16,
		inode_area_size: params.inode_area_blocks as u16,
		block_size: block_size_sectors,
		disk_size: params.block_quantity,
		checksum: 0,
	};
	sb.checksum = sb.compute_checksum();

	dev.write_sector(partition.first_sector, &sb.to_bytes())?;

	let geometry = Geometry::new(partition, &sb);
	zero_region(dev, geometry.block_bitmap_start, sb.free_blocks_bitmap_size as u32 * sb.block_size as u32)?;
	zero_region(dev, geometry.inode_bitmap_start, sb.free_inode_bitmap_size as u32 * sb.block_size as u32)?;

	let volume_size = utils::util::ByteSize::from_sectors_count(
		partition.sectors_count() as u64,
		crate::SECTOR_SIZE as u64,
	);
	info!(
		"formatted partition [{}..={}] ({volume_size}) with {} blocks of {} sectors, {} inodes",
		partition.first_sector, partition.last_sector, params.block_quantity, block_size_sectors, params.inode_count
	);

	Ok(sb)
}

fn zero_region(dev: &mut impl BlockDevice, start: u32, sectors: u32) -> Result<()> {
	let zero = zeroed_sector();
	for s in 0..sectors {
		dev.write_sector(start + s, &zero)?;
	}
	Ok(())
}

/// Builds the `Bitmaps` façade for a mounted partition.
pub fn bitmaps_for(sb: &Superblock, geometry: &Geometry) -> Bitmaps {
	Bitmaps {
		inode: BitmapRegion {
			start_sector: geometry.inode_bitmap_start,
			sectors_count: sb.free_inode_bitmap_size as u32 * sb.block_size as u32,
		},
		data: BitmapRegion {
			start_sector: geometry.block_bitmap_start,
			sectors_count: sb.free_blocks_bitmap_size as u32 * sb.block_size as u32,
		},
	}
}

/// Creates the root directory: allocates inode 0 and its first data block,
/// zeroing that block so every slot reads as an invalid record.
///
/// Fails with [`T2fsError::AlreadyFormatted`] if inode 0 is already marked
/// in use. If the data-block allocation fails after the inode bit has
/// already been set, the inode bit is rolled back before the error is
/// returned (`spec.md` §9).
pub fn create_root_folder(
	dev: &mut impl BlockDevice,
	sb: &Superblock,
	geometry: &Geometry,
) -> Result<()> {
	let bitmaps = bitmaps_for(sb, geometry);

	if bitmaps.search(dev, BitmapKind::Inode, true)?.is_some() {
		return Err(T2fsError::AlreadyFormatted);
	}
	bitmaps.set(dev, BitmapKind::Inode, 0, true)?;

	let data_block = match bitmaps.search(dev, BitmapKind::Data, false)? {
		Some(idx) => idx,
		None => {
			bitmaps.set(dev, BitmapKind::Inode, 0, false)?;
			return Err(T2fsError::NoSpace);
		}
	};
	if let Err(e) = bitmaps.set(dev, BitmapKind::Data, data_block, true) {
		if let Err(rollback_err) = bitmaps.set(dev, BitmapKind::Inode, 0, false) {
			warn!("failed to roll back inode bit 0 after a failed root-folder creation: {rollback_err}");
		}
		return Err(e);
	}

	if let Err(e) = zero_region(dev, geometry.data_area_start + data_block * sb.block_size as u32, sb.block_size as u32) {
		let _ = bitmaps.set(dev, BitmapKind::Data, data_block, false);
		let _ = bitmaps.set(dev, BitmapKind::Inode, 0, false);
		return Err(e);
	}

	let mut root = Inode::root();
	root.data_ptr[0] = data_block;
	root.write(dev, geometry, 0)?;

	info!("created root directory in data block {data_block}");
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::device::FileDevice;
	use crate::directory;
	use std::io::Write as _;

	fn dev_with_sectors(n: usize) -> (tempfile::NamedTempFile, FileDevice) {
		let mut tmp = tempfile::NamedTempFile::new().unwrap();
		tmp.write_all(&vec![0u8; crate::SECTOR_SIZE * n]).unwrap();
		let dev = FileDevice::open(tmp.path()).unwrap();
		(tmp, dev)
	}

	#[test]
	fn format_then_create_root_folder() {
		let (_tmp, mut dev) = dev_with_sectors(4096);
		let partition = Partition {
			first_sector: 1,
			last_sector: 4095,
		};
		let sb = format(&mut dev, &partition, 4).unwrap();
		let geometry = Geometry::new(&partition, &sb);
		create_root_folder(&mut dev, &sb, &geometry).unwrap();

		let root = Inode::read(&mut dev, &geometry, 0).unwrap();
		assert_eq!(root.blocks_file_size, 1);
		assert!(directory::is_empty(&mut dev, &sb, &geometry, &root).unwrap());
	}

	#[test]
	fn create_root_folder_twice_fails() {
		let (_tmp, mut dev) = dev_with_sectors(4096);
		let partition = Partition {
			first_sector: 1,
			last_sector: 4095,
		};
		let sb = format(&mut dev, &partition, 4).unwrap();
		let geometry = Geometry::new(&partition, &sb);
		create_root_folder(&mut dev, &sb, &geometry).unwrap();
		assert!(matches!(
			create_root_folder(&mut dev, &sb, &geometry),
			Err(T2fsError::AlreadyFormatted)
		));
	}
}
