//! The public façade (`spec.md` §5): mounts a partition, keeps its bitmaps
//! and root inode resident, and multiplexes a fixed-capacity table of open
//! file handles over it.

use crate::bitmap::BitmapKind;
use crate::bitmap::Bitmaps;
use crate::directory;
use crate::directory::DirectoryRecord;
use crate::file::OpenFile;
use crate::format;
use crate::inode::Inode;
use crate::mbr::Mbr;
use crate::mbr::Partition;
use crate::superblock::Geometry;
use crate::superblock::Superblock;
use crate::BlockDevice;
use crate::Result;
use crate::T2fsError;
use crate::MAX_OPEN_FILES;
use log::debug;

struct Mounted {
	partition: Partition,
	sb: Superblock,
	geometry: Geometry,
	bitmaps: Bitmaps,
	root: Inode,
}

/// A mounted T2FS volume over a device `D`.
///
/// Generic over the device rather than boxing a `dyn BlockDevice`: every
/// sector access on the hot read/write path goes through a monomorphized,
/// statically dispatched call.
pub struct FileSystem<D: BlockDevice> {
	dev: D,
	mbr: Mbr,
	mounted: Option<Mounted>,
	open_files: Vec<Option<OpenFile>>,
	dir_cursor: Option<u32>,
}

impl<D: BlockDevice> FileSystem<D> {
	/// Reads the MBR off `dev` and prepares an unmounted filesystem context.
	pub fn new(mut dev: D) -> Result<Self> {
		let mbr = Mbr::read(&mut dev)?;
		Ok(Self {
			dev,
			mbr,
			mounted: None,
			open_files: (0..MAX_OPEN_FILES).map(|_| None).collect(),
			dir_cursor: None,
		})
	}

	/// Formats `partition_index` as a fresh, empty T2FS volume and creates
	/// its root directory.
	pub fn format(&mut self, partition_index: usize, block_size_sectors: u16) -> Result<()> {
		let partition = self.mbr.partition(partition_index)?;
		let sb = format::format(&mut self.dev, &partition, block_size_sectors)?;
		let geometry = Geometry::new(&partition, &sb);
		format::create_root_folder(&mut self.dev, &sb, &geometry)?;
		Ok(())
	}

	/// Mounts `partition_index`, reading its superblock and root inode.
	pub fn mount(&mut self, partition_index: usize) -> Result<()> {
		let partition = self.mbr.partition(partition_index)?;
		let sb = Superblock::read(&mut self.dev, &partition)?;
		let geometry = Geometry::new(&partition, &sb);
		let bitmaps = format::bitmaps_for(&sb, &geometry);
		let root = Inode::read(&mut self.dev, &geometry, 0)?;
		self.mounted = Some(Mounted {
			partition,
			sb,
			geometry,
			bitmaps,
			root,
		});
		debug!("mounted partition {partition_index}");
		Ok(())
	}

	/// Unmounts the current partition, discarding its cached root inode.
	pub fn umount(&mut self) -> Result<()> {
		self.require_mounted()?;
		self.mounted = None;
		self.dir_cursor = None;
		Ok(())
	}

	fn require_mounted(&self) -> Result<&Mounted> {
		self.mounted.as_ref().ok_or(T2fsError::NotMounted)
	}

	/// Creates a new, empty regular file named `name` in the root directory.
	pub fn create(&mut self, name: &str) -> Result<()> {
		self.require_mounted()?;
		let mounted = self.mounted.as_mut().ok_or(T2fsError::NotMounted)?;

		if directory::record_by_name(&mut self.dev, &mounted.sb, &mounted.geometry, &mounted.root, name)?
			.is_some()
		{
			return Err(T2fsError::AlreadyExists(name.to_owned()));
		}

		let inode_number = mounted
			.bitmaps
			.search(&mut self.dev, BitmapKind::Inode, false)?
			.ok_or(T2fsError::NoSpace)?;
		mounted.bitmaps.set(&mut self.dev, BitmapKind::Inode, inode_number, true)?;

		let new_inode = Inode::default();
		if let Err(e) = new_inode.write(&mut self.dev, &mounted.geometry, inode_number) {
			let _ = mounted.bitmaps.set(&mut self.dev, BitmapKind::Inode, inode_number, false);
			return Err(e);
		}

		let record = DirectoryRecord::new(name, inode_number);
		if let Err(e) = directory::insert_record(
			&mut self.dev,
			&mounted.sb,
			&mounted.geometry,
			&mounted.bitmaps,
			&mut mounted.root,
			record,
		) {
			let _ = mounted.bitmaps.set(&mut self.dev, BitmapKind::Inode, inode_number, false);
			return Err(e);
		}

		mounted.root.write(&mut self.dev, &mounted.geometry, 0)?;
		Ok(())
	}

	/// Removes `name` from the root directory and reclaims its inode and
	/// data blocks.
	pub fn delete(&mut self, name: &str) -> Result<()> {
		self.require_mounted()?;
		let mounted = self.mounted.as_mut().ok_or(T2fsError::NotMounted)?;

		let (_, record) =
			directory::record_by_name(&mut self.dev, &mounted.sb, &mounted.geometry, &mounted.root, name)?
				.ok_or_else(|| T2fsError::NotFound(name.to_owned()))?;

		let mut inode = Inode::read(&mut self.dev, &mounted.geometry, record.inode_number)?;
		inode.clear(&mounted.sb, &mounted.geometry, &mounted.bitmaps, &mut self.dev)?;
		mounted
			.bitmaps
			.set(&mut self.dev, BitmapKind::Inode, record.inode_number, false)?;
		directory::remove_record(&mut self.dev, &mounted.sb, &mounted.geometry, &mounted.root, name)?;
		Ok(())
	}

	/// Opens `name` for reading and writing, returning a handle for
	/// [`read`](Self::read)/[`write`](Self::write)/[`seek`](Self::seek).
	pub fn open(&mut self, name: &str) -> Result<usize> {
		self.require_mounted()?;
		let handle = self
			.open_files
			.iter()
			.position(Option::is_none)
			.ok_or(T2fsError::TooManyOpenFiles)?;

		let mounted = self.mounted.as_ref().ok_or(T2fsError::NotMounted)?;
		let (slot, record) =
			directory::record_by_name(&mut self.dev, &mounted.sb, &mounted.geometry, &mounted.root, name)?
				.ok_or_else(|| T2fsError::NotFound(name.to_owned()))?;
		let inode = Inode::read(&mut self.dev, &mounted.geometry, record.inode_number)?;

		self.open_files[handle] = Some(OpenFile {
			inode_number: record.inode_number,
			slot,
			inode,
			cursor: 0,
		});
		Ok(handle)
	}

	/// Flushes and closes `handle`, writing its inode and directory record
	/// back to disk.
	pub fn close(&mut self, handle: usize) -> Result<()> {
		self.require_mounted()?;
		let open = self
			.open_files
			.get_mut(handle)
			.and_then(Option::take)
			.ok_or(T2fsError::InvalidHandle(handle))?;

		self.sync_open_file(&open)?;
		Ok(())
	}

	fn sync_open_file(&mut self, open: &OpenFile) -> Result<()> {
		let mounted = self.mounted.as_ref().ok_or(T2fsError::NotMounted)?;
		open.inode.write(&mut self.dev, &mounted.geometry, open.inode_number)?;

		let mut record =
			directory::record_by_index(&mut self.dev, &mounted.sb, &mounted.geometry, &mounted.root, open.slot)?;
		record.blocks_file_size = open.inode.blocks_file_size;
		record.bytes_file_size = open.inode.bytes_file_size;
		directory::write_record(&mut self.dev, &mounted.sb, &mounted.geometry, &mounted.root, open.slot, record)?;
		Ok(())
	}

	/// Reads from `handle` into `buf` at its current cursor.
	pub fn read(&mut self, handle: usize, buf: &mut [u8]) -> Result<usize> {
		let mounted = self.mounted.as_ref().ok_or(T2fsError::NotMounted)?;
		let sb = mounted.sb;
		let geometry = mounted.geometry;
		let open = self
			.open_files
			.get_mut(handle)
			.and_then(Option::as_mut)
			.ok_or(T2fsError::InvalidHandle(handle))?;
		open.read(&sb, &geometry, &mut self.dev, buf)
	}

	/// Writes `data` to `handle` at its current cursor, growing the file as
	/// needed, then immediately flushes its inode and directory record.
	pub fn write(&mut self, handle: usize, data: &[u8]) -> Result<usize> {
		let mounted = self.mounted.as_ref().ok_or(T2fsError::NotMounted)?;
		let sb = mounted.sb;
		let geometry = mounted.geometry;
		let bitmaps = mounted.bitmaps;
		let open = self
			.open_files
			.get_mut(handle)
			.and_then(Option::as_mut)
			.ok_or(T2fsError::InvalidHandle(handle))?;
		let written = open.write(&sb, &geometry, &bitmaps, &mut self.dev, data)?;

		let open = self.open_files[handle].clone().expect("handle validated above");
		self.sync_open_file(&open)?;
		Ok(written)
	}

	/// Moves `handle`'s cursor to an absolute byte offset. Passing
	/// [`crate::file::SEEK_TO_END`] moves it to the file's current end.
	pub fn seek(&mut self, handle: usize, offset: u32) -> Result<()> {
		self.open_files
			.get_mut(handle)
			.and_then(Option::as_mut)
			.ok_or(T2fsError::InvalidHandle(handle))?
			.seek(offset)
	}

	/// Opens the root directory for [`readdir`](Self::readdir), resetting
	/// its cursor to the first slot.
	pub fn opendir(&mut self) -> Result<()> {
		self.require_mounted()?;
		self.dir_cursor = Some(0);
		Ok(())
	}

	/// Closes the root directory cursor.
	pub fn closedir(&mut self) -> Result<()> {
		self.require_mounted()?;
		self.dir_cursor = None;
		Ok(())
	}

	/// Returns the next valid record, or `None` once every slot has been
	/// visited. Fails with [`T2fsError::RootNotOpened`] if `opendir` was not
	/// called first.
	pub fn readdir(&mut self) -> Result<Option<DirectoryRecord>> {
		let mounted = self.mounted.as_ref().ok_or(T2fsError::NotMounted)?;
		let mut cursor = self.dir_cursor.ok_or(T2fsError::RootNotOpened)?;
		let capacity =
			(mounted.root.blocks_file_size * mounted.sb.block_size_sectors() * crate::SECTOR_SIZE as u32)
				/ directory::RECORD_SIZE as u32;

		let found = loop {
			if cursor >= capacity {
				break None;
			}
			let record =
				directory::record_by_index(&mut self.dev, &mounted.sb, &mounted.geometry, &mounted.root, cursor)?;
			cursor += 1;
			if record.is_valid() {
				break Some(record);
			}
		};
		self.dir_cursor = Some(cursor);
		Ok(found)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::device::FileDevice;
	use crate::mbr::Mbr;
	use std::io::Write as _;

	fn fresh_fs(sectors: usize) -> FileSystem<FileDevice> {
		let mut tmp = tempfile::NamedTempFile::new().unwrap();
		tmp.write_all(&vec![0u8; crate::SECTOR_SIZE * sectors]).unwrap();
		// `FileDevice` keeps its own handle open, so the backing file can be
		// unlinked as soon as it is opened here (standard Unix delete-on-close).
		let mut dev = FileDevice::open(tmp.path()).unwrap();

		let mut mbr = Mbr::default();
		mbr.partitions[0] = Partition {
			first_sector: 1,
			last_sector: sectors as u32 - 1,
		};
		mbr.write(&mut dev).unwrap();

		let mut fs = FileSystem::new(dev).unwrap();
		fs.format(0, 4).unwrap();
		fs.mount(0).unwrap();
		fs
	}

	#[test]
	fn create_write_read_roundtrip() {
		let mut fs = fresh_fs(8192);
		fs.create("hello.txt").unwrap();
		let handle = fs.open("hello.txt").unwrap();
		fs.write(handle, b"hello, t2fs").unwrap();
		fs.seek(handle, 0).unwrap();
		let mut buf = [0u8; 11];
		let n = fs.read(handle, &mut buf).unwrap();
		assert_eq!(n, 11);
		assert_eq!(&buf, b"hello, t2fs");
		fs.close(handle).unwrap();
	}

	#[test]
	fn creating_a_file_advances_root_bytes_file_size() {
		let mut fs = fresh_fs(8192);
		fs.create("a.txt").unwrap();
		let mounted = fs.mounted.as_ref().unwrap();
		let root = Inode::read(&mut fs.dev, &mounted.geometry, 0).unwrap();
		assert_eq!(root.bytes_file_size, directory::RECORD_SIZE as u32);
	}

	#[test]
	fn seek_to_end_moves_cursor_past_last_write() {
		let mut fs = fresh_fs(8192);
		fs.create("a.txt").unwrap();
		let handle = fs.open("a.txt").unwrap();
		fs.write(handle, b"hello").unwrap();
		fs.seek(handle, crate::file::SEEK_TO_END).unwrap();
		assert!(fs.write(handle, b" world").is_ok());
		fs.seek(handle, 0).unwrap();
		let mut buf = [0u8; 11];
		fs.read(handle, &mut buf).unwrap();
		assert_eq!(&buf, b"hello world");
		fs.close(handle).unwrap();
	}

	#[test]
	fn create_duplicate_fails() {
		let mut fs = fresh_fs(8192);
		fs.create("a.txt").unwrap();
		assert!(matches!(fs.create("a.txt"), Err(T2fsError::AlreadyExists(_))));
	}

	#[test]
	fn delete_then_recreate() {
		let mut fs = fresh_fs(8192);
		fs.create("a.txt").unwrap();
		fs.delete("a.txt").unwrap();
		assert!(fs.create("a.txt").is_ok());
	}

	#[test]
	fn readdir_lists_created_files() {
		let mut fs = fresh_fs(8192);
		fs.create("a.txt").unwrap();
		fs.create("b.txt").unwrap();
		fs.opendir().unwrap();
		let mut names = Vec::new();
		while let Some(record) = fs.readdir().unwrap() {
			names.push(record.name_str());
		}
		names.sort();
		assert_eq!(names, vec!["a.txt".to_owned(), "b.txt".to_owned()]);
	}

	#[test]
	fn write_spanning_multiple_blocks() {
		let mut fs = fresh_fs(8192);
		fs.create("big.bin").unwrap();
		let handle = fs.open("big.bin").unwrap();
		let data = vec![0xABu8; 4 * crate::SECTOR_SIZE * 3 + 17];
		fs.write(handle, &data).unwrap();
		fs.seek(handle, 0).unwrap();
		let mut readback = vec![0u8; data.len()];
		let n = fs.read(handle, &mut readback).unwrap();
		assert_eq!(n, data.len());
		assert_eq!(readback, data);
		fs.close(handle).unwrap();
	}
}
