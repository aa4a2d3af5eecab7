//! The block device adapter.
//!
//! T2FS treats the storage device as a flat array of fixed-size sectors. The
//! core never reasons about files, offsets in bytes, or anything below
//! sector granularity; everything above this module works in absolute
//! sector numbers (`lba`, relative to the start of the whole device, not the
//! partition).

use crate::SECTOR_SIZE;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::path::Path;

/// A single 256-byte sector.
pub type Sector = [u8; SECTOR_SIZE];

/// Returns a sector buffer filled with zeroes.
pub fn zeroed_sector() -> Sector {
	[0; SECTOR_SIZE]
}

/// A sector-addressable block device.
///
/// This is the boundary the core is built on: an implementation backs
/// `lba` 0 with the MBR, and every sector beyond it with whatever the
/// partitions describe. T2FS ships a single implementation,
/// [`FileDevice`], which plays the role of a virtual disk backed by a
/// regular file; any other backing store (an actual block device, an
/// in-memory buffer for tests) just needs to implement this trait.
pub trait BlockDevice {
	/// Reads the sector at `lba` into `buf`.
	fn read_sector(&mut self, lba: u32, buf: &mut Sector) -> io::Result<()>;

	/// Writes `buf` to the sector at `lba`.
	fn write_sector(&mut self, lba: u32, buf: &Sector) -> io::Result<()>;
}

/// A [`BlockDevice`] backed by a regular file, standing in for a virtual
/// disk.
pub struct FileDevice {
	file: File,
}

impl FileDevice {
	/// Opens the file at `path` as a virtual disk.
	///
	/// The file must already exist; `mkt2fs` is responsible for creating it
	/// at the right size before formatting.
	pub fn open(path: &Path) -> io::Result<Self> {
		let file = OpenOptions::new().read(true).write(true).open(path)?;
		Ok(Self { file })
	}

	/// Returns the number of sectors in the backing file.
	pub fn sectors_count(&self) -> io::Result<u64> {
		Ok(self.file.metadata()?.len() / SECTOR_SIZE as u64)
	}
}

impl BlockDevice for FileDevice {
	fn read_sector(&mut self, lba: u32, buf: &mut Sector) -> io::Result<()> {
		self.file.seek(SeekFrom::Start(lba as u64 * SECTOR_SIZE as u64))?;
		self.file.read_exact(buf)
	}

	fn write_sector(&mut self, lba: u32, buf: &Sector) -> io::Result<()> {
		self.file.seek(SeekFrom::Start(lba as u64 * SECTOR_SIZE as u64))?;
		self.file.write_all(buf)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::io::Write as _;

	#[test]
	fn read_write_roundtrip() {
		let mut tmp = tempfile::NamedTempFile::new().unwrap();
		tmp.write_all(&[0u8; SECTOR_SIZE * 4]).unwrap();

		let mut dev = FileDevice::open(tmp.path()).unwrap();
		let mut sector = zeroed_sector();
		sector[0] = 0x42;
		sector[SECTOR_SIZE - 1] = 0x24;
		dev.write_sector(2, &sector).unwrap();

		let mut readback = zeroed_sector();
		dev.read_sector(2, &mut readback).unwrap();
		assert_eq!(sector, readback);

		// Untouched sectors stay zeroed.
		let mut other = zeroed_sector();
		dev.read_sector(1, &mut other).unwrap();
		assert_eq!(other, zeroed_sector());
	}
}
