//! The `mkt2fs` tool creates a T2FS filesystem on a device image: a single
//! partition spanning the whole device, formatted and given a root
//! directory.

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::exit;
use t2fs::device::FileDevice;
use t2fs::mbr::Mbr;
use t2fs::mbr::Partition;
use t2fs::FileSystem;
use t2fs::SECTOR_SIZE;

/// Structure storing command line arguments.
#[derive(Default)]
struct Args {
	/// The name of the current program used in command line.
	prog: String,

	/// If true, print command line help.
	help: bool,

	/// The number of sectors per block, selected with `-b`.
	block_size: u16,

	/// The path to the device file on which the filesystem will be created.
	device_path: Option<PathBuf>,
}

fn parse_args() -> Args {
	let mut args = Args {
		block_size: 4,
		..Default::default()
	};
	let mut iter = env::args();

	args.prog = iter.next().unwrap_or_else(|| "mkt2fs".to_owned());

	while let Some(arg) = iter.next() {
		match arg.as_str() {
			"-h" | "--help" => args.help = true,

			"-b" | "--block-size" => {
				let value = iter.next().unwrap_or_else(|| {
					eprintln!("{}: {}: missing value", args.prog, arg);
					exit(1);
				});
				args.block_size = value.parse().unwrap_or_else(|_| {
					eprintln!("{}: {}: invalid block size", args.prog, value);
					exit(1);
				});
			}

			_ => args.device_path = Some(PathBuf::from(arg)),
		}
	}

	args
}

fn print_usage(prog: &str) {
	println!("Usage: {prog} [-b BLOCK_SIZE] DEVICE");
	println!("Formats DEVICE as a T2FS volume with a single partition spanning the whole device.");
	println!();
	println!("  -b, --block-size SECTORS  sectors per block (default: 4)");
	println!("  -h, --help                print this help");
}

fn main() {
	env_logger::init();
	let args = parse_args();

	if args.help {
		print_usage(&args.prog);
		return;
	}

	let device_path = args.device_path.unwrap_or_else(|| {
		eprintln!("{}: specify path to a device", args.prog);
		exit(1);
	});

	let sectors_count = OpenOptions::new()
		.read(true)
		.open(&device_path)
		.and_then(|f| f.metadata())
		.unwrap_or_else(|e| {
			eprintln!("{}: {}: {}", args.prog, device_path.display(), e);
			exit(1);
		})
		.len()
		/ SECTOR_SIZE as u64;

	if sectors_count < 2 {
		eprintln!("{}: {}: device too small", args.prog, device_path.display());
		exit(1);
	}

	let mut dev = FileDevice::open(&device_path).unwrap_or_else(|e| {
		eprintln!("{}: {}: {}", args.prog, device_path.display(), e);
		exit(1);
	});

	let mut mbr = Mbr::default();
	mbr.partitions[0] = Partition {
		first_sector: 1,
		last_sector: sectors_count as u32 - 1,
	};
	mbr.write(&mut dev).unwrap_or_else(|e| {
		eprintln!("{}: {}: failed to write partition table: {}", args.prog, device_path.display(), e);
		exit(1);
	});

	let mut fs = FileSystem::new(dev).unwrap_or_else(|e| {
		eprintln!("{}: {}: {}", args.prog, device_path.display(), e);
		exit(1);
	});
	fs.format(0, args.block_size).unwrap_or_else(|e| {
		eprintln!("{}: {}: failed to format: {}", args.prog, device_path.display(), e);
		exit(1);
	});

	println!("{}: formatted {} blocks of {} sectors", device_path.display(), sectors_count as u32 / args.block_size as u32, args.block_size);
}
