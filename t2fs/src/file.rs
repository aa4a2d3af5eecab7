//! Cursor-driven file I/O (`spec.md` §4.7): each open handle tracks its own
//! byte cursor and grows its inode on demand as a write crosses into an
//! unallocated block.

use crate::bitmap::Bitmaps;
use crate::device::zeroed_sector;
use crate::error::Result;
use crate::error::T2fsError;
use crate::inode::Inode;
use crate::superblock::Geometry;
use crate::superblock::Superblock;
use crate::BlockDevice;
use crate::SECTOR_SIZE;

/// Passing this as `seek`'s offset moves the cursor to the current end of
/// the file (`spec.md` §6.3's "a sentinel value seeks to end").
pub const SEEK_TO_END: u32 = u32::MAX;

/// One entry of the open-file table.
#[derive(Clone, Debug)]
pub struct OpenFile {
	/// The inode this handle reads and writes.
	pub inode_number: u32,
	/// The handle's directory slot, so closing can flush sizes back.
	pub slot: u32,
	/// A private copy of the inode, mutated in place as the file grows.
	pub inode: Inode,
	/// The current byte offset into the file.
	pub cursor: u32,
}

impl OpenFile {
	fn block_bytes(sb: &Superblock) -> usize {
		sb.block_size_sectors() as usize * SECTOR_SIZE
	}

	/// Reads up to `buf.len()` bytes starting at the cursor, stopping at
	/// end-of-file. Returns the number of bytes actually read and advances
	/// the cursor by that amount.
	pub fn read(
		&mut self,
		sb: &Superblock,
		geometry: &Geometry,
		dev: &mut impl BlockDevice,
		buf: &mut [u8],
	) -> Result<usize> {
		let remaining_file = self.inode.bytes_file_size.saturating_sub(self.cursor) as usize;
		let to_read = buf.len().min(remaining_file);
		let block_bytes = Self::block_bytes(sb);
		let mut done = 0;

		while done < to_read {
			let pos = self.cursor as usize + done;
			let block = (pos / block_bytes) as u32;
			let byte_in_block = pos % block_bytes;
			let sector_in_block = (byte_in_block / SECTOR_SIZE) as u32;
			let byte_in_sector = byte_in_block % SECTOR_SIZE;

			let sector = self.inode.resolve(sb, geometry, dev, block, sector_in_block)?;
			let mut sector_buf = zeroed_sector();
			dev.read_sector(sector, &mut sector_buf)?;

			let take = (SECTOR_SIZE - byte_in_sector).min(to_read - done);
			buf[done..done + take].copy_from_slice(&sector_buf[byte_in_sector..byte_in_sector + take]);
			done += take;
		}

		self.cursor += done as u32;
		Ok(done)
	}

	/// Writes `data` starting at the cursor, growing the inode one block at
	/// a time as the write reaches past its currently allocated blocks.
	/// Returns the number of bytes written and advances the cursor and
	/// `bytes_file_size` accordingly.
	pub fn write(
		&mut self,
		sb: &Superblock,
		geometry: &Geometry,
		bitmaps: &Bitmaps,
		dev: &mut impl BlockDevice,
		data: &[u8],
	) -> Result<usize> {
		let block_bytes = Self::block_bytes(sb);
		let mut done = 0;

		while done < data.len() {
			let pos = self.cursor as usize + done;
			let block = (pos / block_bytes) as u32;
			if block >= self.inode.blocks_file_size {
				self.inode.grow(sb, geometry, bitmaps, dev)?;
			}
			let byte_in_block = pos % block_bytes;
			let sector_in_block = (byte_in_block / SECTOR_SIZE) as u32;
			let byte_in_sector = byte_in_block % SECTOR_SIZE;

			let sector = self.inode.resolve(sb, geometry, dev, block, sector_in_block)?;
			let mut sector_buf = zeroed_sector();
			dev.read_sector(sector, &mut sector_buf)?;

			let take = (SECTOR_SIZE - byte_in_sector).min(data.len() - done);
			sector_buf[byte_in_sector..byte_in_sector + take].copy_from_slice(&data[done..done + take]);
			dev.write_sector(sector, &sector_buf)?;
			done += take;
		}

		self.cursor += done as u32;
		if self.cursor > self.inode.bytes_file_size {
			self.inode.bytes_file_size = self.cursor;
		}
		Ok(done)
	}

	/// Moves the cursor to an absolute byte offset, which must not exceed
	/// the file's current size. `SEEK_TO_END` moves the cursor to the
	/// file's current end regardless of its size.
	pub fn seek(&mut self, offset: u32) -> Result<()> {
		if offset == SEEK_TO_END {
			self.cursor = self.inode.bytes_file_size;
			return Ok(());
		}
		if offset > self.inode.bytes_file_size {
			return Err(T2fsError::OutOfRange {
				block: offset,
				blocks_file_size: self.inode.bytes_file_size,
			});
		}
		self.cursor = offset;
		Ok(())
	}
}
