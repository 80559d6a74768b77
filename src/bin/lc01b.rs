#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate lc01b_eeprom;
use lc01b_eeprom::*;

use std::process::exit;

use lc01b_eeprom::gpio::SysfsLines;
use lc01b_eeprom::i2c::{
	BitBang,
	CAPACITY,
	PAGE_SIZE,
};
use lc01b_eeprom::nvm::{
	EraseSize,
	MemoryWordStore,
	OFFSET_LAST,
	WordStore,
	WriteMode,
};
use lc01b_eeprom::sim::SimDevice;

type Device<'a> = Eeprom<&'a mut dyn BusTransport>;

fn get_param<T>(matches: &clap::ArgMatches, name: &str) -> AResult<T>
where
	T: std::str::FromStr,
	failure::Error: From<<T as std::str::FromStr>::Err>,
{
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	param.parse::<T>().map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("invalid parameter {}: {}", name, e);
		e.context(msg).into()
	})
}

fn get_number<T: FromStrRadix>(matches: &clap::ArgMatches, name: &str) -> AResult<T> {
	match matches.value_of(name) {
		Some(p) => parse_number(p).map_err(|e| {
			let msg = format!("invalid parameter {}: {}", name, e);
			e.context(msg).into()
		}),
		None => bail!("missing parameter {}", name),
	}
}

fn parse_gpios(s: &str) -> AResult<(u32, u32)> {
	let mut parts = s.splitn(2, ',');
	let scl = parts.next().unwrap_or("");
	let sda = match parts.next() {
		Some(sda) => sda,
		None => bail!("expected SCL,SDA GPIO numbers, got {:?}", s),
	};
	Ok((parse_number(scl.trim())?, parse_number(sda.trim())?))
}

fn build_config(matches: &clap::ArgMatches) -> AResult<Config> {
	let mut config = Config::default();
	if matches.is_present("speed") {
		config.speed = get_param(matches, "speed")?;
	}
	if matches.is_present("strict_bounds") {
		config.bounds = BoundsPolicy::Strict;
	}
	if matches.is_present("poll_limit") {
		config.poll_limit = get_number(matches, "poll_limit")?;
		ensure!(config.poll_limit > 0, "poll limit must be at least 1");
	}
	Ok(config)
}

fn with_device<F>(matches: &clap::ArgMatches, f: F) -> AResult<()>
where
	F: FnOnce(&mut Device) -> AResult<()>,
{
	let config = build_config(matches)?;
	match matches.value_of("gpio") {
		Some(gpios) => {
			let (scl, sda) = parse_gpios(gpios)?;
			info!("using GPIO {} (SCL) and {} (SDA) at {}", scl, sda, config.speed);
			let lines = SysfsLines::open(scl, sda)?;
			let mut bus = BitBang::new(lines, &config);
			f(&mut Eeprom::with_config(&mut bus as &mut dyn BusTransport, config))
		},
		None => {
			info!("no GPIOs given, using a simulated (erased) EEPROM");
			let mut sim = SimDevice::new();
			f(&mut Eeprom::with_config(&mut sim as &mut dyn BusTransport, config))
		},
	}
}

fn hex_dump(start: usize, data: &[u8]) {
	for (i, byte) in data.iter().enumerate() {
		if 0 == i % 16 {
			print!("{:02x} ", start + i);
		} else if 0 == i % 8 {
			print!(" ");
		}
		print!(" {:02x}", byte);
		if 15 == i % 16 {
			println!("");
		}
	}
	if 0 != data.len() % 16 {
		println!("");
	}
}

fn dump(dev: &mut Device) -> AResult<()> {
	let mut data = [0u8; CAPACITY];
	dev.read_sequence(0, &mut data)?;
	hex_dump(0, &data);
	Ok(())
}

fn read_byte(dev: &mut Device, sub_m: &clap::ArgMatches) -> AResult<()> {
	let address: u8 = get_number(sub_m, "ADDRESS")?;
	let value = dev.read_byte(address)?;
	println!("@{:02x}: {:02x}", address, value);
	Ok(())
}

fn write_byte(dev: &mut Device, sub_m: &clap::ArgMatches) -> AResult<()> {
	let address: u8 = get_number(sub_m, "ADDRESS")?;
	let value: u8 = get_number(sub_m, "VALUE")?;
	dev.write_byte(address, value)?;
	Ok(())
}

fn write_page(dev: &mut Device, sub_m: &clap::ArgMatches) -> AResult<()> {
	let address: u8 = get_number(sub_m, "ADDRESS")?;
	let data = sub_m.values_of("BYTES").into_iter().flatten()
		.map(parse_number::<u8>)
		.collect::<AResult<Vec<u8>>>()?;
	ensure!(data.len() <= PAGE_SIZE, "at most {} bytes fit into a page, got {}", PAGE_SIZE, data.len());
	dev.write_page(address, &data)?;
	Ok(())
}

fn demo(dev: &mut Device) -> AResult<()> {
	dev.write_byte(0x00, 0x45)?;
	let value = dev.read_byte(0x00)?;
	info!("byte round trip: wrote 0x45, read 0x{:02x}", value);
	ensure!(value == 0x45, "byte round trip failed: read 0x{:02x}", value);

	let pi = 3.14f32;
	dev.write_object(0x00, &pi)?;
	let read_pi: f32 = dev.read_object(0x00)?;
	info!("float round trip: wrote {}, read {}", pi, read_pi);
	ensure!(read_pi.to_bits() == pi.to_bits(), "float round trip failed: read {}", read_pi);

	let big = 1844674407370955161u64;
	dev.write_object(0x10, &big)?;
	let read_big: u64 = dev.read_object(0x10)?;
	info!("u64 round trip: wrote {}, read {}", big, read_big);
	ensure!(read_big == big, "u64 round trip failed: read {}", read_big);

	// fill the whole memory page by page with its own addresses
	for page in (0..CAPACITY).step_by(PAGE_SIZE) {
		let data: Vec<u8> = (page..page + PAGE_SIZE).map(|a| a as u8).collect();
		dev.write_page(page as u8, &data)?;
	}
	let mut memory = [0u8; CAPACITY];
	dev.read_sequence(0, &mut memory)?;
	hex_dump(0, &memory);
	ensure!(memory.iter().enumerate().all(|(a, &b)| a as u8 == b), "memory fill didn't read back");

	let mut store = MemoryWordStore::new();
	store.write(WriteMode::EraseFirst, 0, 0xdead)?;
	store.write(WriteMode::EraseFirst, OFFSET_LAST, 0xdead)?;
	info!("word store: first 0x{:04x}, last 0x{:04x}", store.read(0)?, store.read(OFFSET_LAST)?);

	let words: Vec<u16> = memory.chunks(2).map(|w| u16::from(w[0]) | u16::from(w[1]) << 8).collect();
	store.write_seq(WriteMode::EraseFirst, 0, &words)?;
	store.erase(EraseSize::Four, 24)?;
	let mut copy = vec![0u16; words.len()];
	store.read_seq(0, &mut copy)?;
	for (i, row) in copy.chunks(8).enumerate() {
		let row: Vec<String> = row.iter().map(|w| format!("{:04x}", w)).collect();
		println!("{:03x}  {}", i * 16, row.join(" "));
	}

	store.erase(EraseSize::Bulk, 0)?;
	store.write_seq(WriteMode::ProgramOnly, 0, &[0xa5a5; 256])?;
	let mut all = [0u16; 256];
	store.read_seq(0, &mut all)?;
	ensure!(all.iter().all(|&w| w == 0xa5a5), "word store program-only fill didn't read back");
	info!("word store: program-only fill verified");

	Ok(())
}

fn main_app() -> AResult<()> {
	let matches = clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(@arg gpio: -g --gpio +takes_value +global "GPIO numbers for the bus lines (SCL,SDA); simulated EEPROM if missing")
		(@arg speed: -s --speed +takes_value +global "bus speed in kHz (100 or 400)")
		(@arg strict_bounds: --("strict-bounds") +global "reject spans running past the end of memory")
		(@arg poll_limit: --("poll-limit") +takes_value +global "maximum acknowledge polls after a write")
		(@subcommand demo =>
			(about: "run the demonstration sequence (overwrites the whole EEPROM)")
		)
		(@subcommand dump =>
			(about: "hex dump the whole EEPROM")
		)
		(@subcommand read_byte =>
			(about: "read a single byte")
			(@arg ADDRESS: +required "memory address")
		)
		(@subcommand write_byte =>
			(about: "write a single byte")
			(@arg ADDRESS: +required "memory address")
			(@arg VALUE: +required "byte to write")
		)
		(@subcommand write_page =>
			(about: "write up to one page in a single transaction")
			(@arg ADDRESS: +required "memory address")
			(@arg BYTES: +required +multiple "bytes to write")
		)
	).get_matches();

	let (cmd, sub_m) = matches.subcommand();
	let sub_m = match sub_m {
		Some(sub_m) => sub_m,
		None => bail!("no subcommand"),
	};
	with_device(sub_m, |dev| {
		match cmd {
			"demo" => demo(dev),
			"dump" => dump(dev),
			"read_byte" => read_byte(dev, sub_m),
			"write_byte" => write_byte(dev, sub_m),
			"write_page" => write_page(dev, sub_m),
			cmd => bail!("not implemented subcommand {:?}", cmd),
		}
	})
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	if let Err(e) = main_app() {
		error!("Error: {}", e);
		if let Some(e) = e.downcast_ref::<EepromError>() {
			error!("status code 0x{:02x}", e.code());
		}
		exit(1);
	}
}
