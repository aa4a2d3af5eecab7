//! The bitmap façade (`spec.md` §4.4): two logical bitmaps per mounted
//! partition (inode bitmap, data-block bitmap), each backed by a
//! contiguous range of sectors. Changes are written through synchronously;
//! the core assumes a `set` has reached the device before it returns.

use crate::device::zeroed_sector;
use crate::device::BlockDevice;
use crate::error::Result;
use crate::SECTOR_SIZE;

/// Which logical bitmap an operation targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitmapKind {
	Inode,
	Data,
}

/// One bitmap's location on disk: a contiguous range of sectors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitmapRegion {
	pub start_sector: u32,
	pub sectors_count: u32,
}

impl BitmapRegion {
	fn bit_location(&self, index: u32) -> (u32, usize, u8) {
		let byte = index / 8;
		let sector = self.start_sector + byte / SECTOR_SIZE as u32;
		let offset = (byte % SECTOR_SIZE as u32) as usize;
		let bit = (index % 8) as u8;
		(sector, offset, bit)
	}

	/// Reads the bit at `index`.
	pub fn get(&self, dev: &mut impl BlockDevice, index: u32) -> Result<bool> {
		let (sector, offset, bit) = self.bit_location(index);
		let mut buf = zeroed_sector();
		dev.read_sector(sector, &mut buf)?;
		Ok(buf[offset] & (1 << bit) != 0)
	}

	/// Sets the bit at `index` to `value`.
	pub fn set(&self, dev: &mut impl BlockDevice, index: u32, value: bool) -> Result<()> {
		let (sector, offset, bit) = self.bit_location(index);
		let mut buf = zeroed_sector();
		dev.read_sector(sector, &mut buf)?;
		if value {
			buf[offset] |= 1 << bit;
		} else {
			buf[offset] &= !(1 << bit);
		}
		dev.write_sector(sector, &buf)?;
		Ok(())
	}

	/// Returns the index of the first bit equal to `value`, or `None` if
	/// there is none within this bitmap's capacity.
	pub fn search(&self, dev: &mut impl BlockDevice, value: bool) -> Result<Option<u32>> {
		let mut buf = zeroed_sector();
		for s in 0..self.sectors_count {
			dev.read_sector(self.start_sector + s, &mut buf)?;
			for (byte_idx, &byte) in buf.iter().enumerate() {
				let target = if value { byte } else { !byte };
				if target != 0 {
					let bit = target.trailing_zeros();
					let index = (s * SECTOR_SIZE as u32 + byte_idx as u32) * 8 + bit;
					return Ok(Some(index));
				}
			}
		}
		Ok(None)
	}
}

/// The pair of bitmaps backing one mounted partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bitmaps {
	pub inode: BitmapRegion,
	pub data: BitmapRegion,
}

impl Bitmaps {
	fn region(&self, which: BitmapKind) -> &BitmapRegion {
		match which {
			BitmapKind::Inode => &self.inode,
			BitmapKind::Data => &self.data,
		}
	}

	/// `spec.md` §4.4's `get`.
	pub fn get(&self, dev: &mut impl BlockDevice, which: BitmapKind, index: u32) -> Result<bool> {
		self.region(which).get(dev, index)
	}

	/// `spec.md` §4.4's `set`.
	pub fn set(
		&self,
		dev: &mut impl BlockDevice,
		which: BitmapKind,
		index: u32,
		value: bool,
	) -> Result<()> {
		self.region(which).set(dev, index, value)
	}

	/// `spec.md` §4.4's `search`; returns `None` instead of `-1` for "not
	/// found".
	pub fn search(&self, dev: &mut impl BlockDevice, which: BitmapKind, value: bool) -> Result<Option<u32>> {
		self.region(which).search(dev, value)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::device::FileDevice;
	use std::io::Write as _;

	fn dev_with_sectors(n: usize) -> (tempfile::NamedTempFile, FileDevice) {
		let mut tmp = tempfile::NamedTempFile::new().unwrap();
		tmp.write_all(&vec![0u8; SECTOR_SIZE * n]).unwrap();
		let dev = FileDevice::open(tmp.path()).unwrap();
		(tmp, dev)
	}

	#[test]
	fn get_set_roundtrip() {
		let (_tmp, mut dev) = dev_with_sectors(2);
		let region = BitmapRegion {
			start_sector: 0,
			sectors_count: 2,
		};
		assert!(!region.get(&mut dev, 17).unwrap());
		region.set(&mut dev, 17, true).unwrap();
		assert!(region.get(&mut dev, 17).unwrap());
		region.set(&mut dev, 17, false).unwrap();
		assert!(!region.get(&mut dev, 17).unwrap());
	}

	#[test]
	fn search_finds_first_zero_and_first_one() {
		let (_tmp, mut dev) = dev_with_sectors(1);
		let region = BitmapRegion {
			start_sector: 0,
			sectors_count: 1,
		};
		assert_eq!(region.search(&mut dev, false).unwrap(), Some(0));
		assert_eq!(region.search(&mut dev, true).unwrap(), None);

		region.set(&mut dev, 0, true).unwrap();
		region.set(&mut dev, 1, true).unwrap();
		assert_eq!(region.search(&mut dev, false).unwrap(), Some(2));
		assert_eq!(region.search(&mut dev, true).unwrap(), Some(0));
	}
}
