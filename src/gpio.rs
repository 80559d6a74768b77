//! Bus lines on Linux sysfs GPIOs
//!
//! Open drain is emulated by switching the direction: `in` releases the line
//! (external pull-up), `low` drives it LOW.

use std::fs;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{
	Path,
	PathBuf,
};
use std::time::Duration;

use crate::i2c::{
	Lines,
	reliable_sleep,
};

pub const SYSFS_GPIO: &str = "/sys/class/gpio";

fn write_exact_at(file: &fs::File, buf: &[u8]) -> io::Result<()> {
	// sysfs attributes need the whole value in one write
	let l = file.write_at(buf, 0)?;
	if l != buf.len() {
		Err(io::Error::new(io::ErrorKind::Other, "failed to write whole buffer"))
	} else {
		Ok(())
	}
}

pub struct SysfsLine {
	number: u32,
	base: PathBuf,
	direction: fs::File,
	value: fs::File,
	exported: bool,
	released: Option<bool>,
}

impl SysfsLine {
	/// open (and export if necessary) GPIO `number` below `base`
	pub fn open_in(base: &Path, number: u32) -> crate::AResult<Self> {
		with_context!(("open GPIO {} in {}", number, base.display()), {
			let dir = base.join(format!("gpio{}", number));
			let mut exported = false;
			if !dir.exists() {
				debug!("exporting GPIO {}", number);
				fs::OpenOptions::new().write(true).open(base.join("export"))?.write_at(number.to_string().as_bytes(), 0)?;
				exported = true;
			}

			// attributes show up (with the right permissions) a little after the export
			let mut attempts = 0;
			let direction = loop {
				match fs::OpenOptions::new().write(true).open(dir.join("direction")) {
					Ok(f) => break f,
					Err(_) if exported && attempts < 10 => {
						attempts += 1;
						reliable_sleep(Duration::from_millis(10));
					},
					Err(e) => return Err(e.into()),
				}
			};
			let value = fs::File::open(dir.join("value"))?;

			let mut line = SysfsLine {
				number,
				base: base.to_path_buf(),
				direction,
				value,
				exported,
				released: None,
			};
			line.set(true)?;
			Ok(line)
		})
	}

	pub fn open(number: u32) -> crate::AResult<Self> {
		Self::open_in(Path::new(SYSFS_GPIO), number)
	}

	pub fn number(&self) -> u32 {
		self.number
	}

	/// release (`true`) or drive LOW (`false`)
	pub fn set(&mut self, release: bool) -> io::Result<()> {
		if self.released == Some(release) {
			return Ok(());
		}
		// "low" switches to output with an initial LOW level in one step
		write_exact_at(&self.direction, if release { b"in" } else { b"low" })?;
		self.released = Some(release);
		Ok(())
	}

	pub fn get(&mut self) -> io::Result<bool> {
		let mut buf = [0u8; 1];
		if 1 != self.value.read_at(&mut buf, 0)? {
			return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "empty GPIO value"));
		}
		match buf[0] {
			b'0' => Ok(false),
			b'1' => Ok(true),
			c => Err(io::Error::new(io::ErrorKind::InvalidData, format!("invalid GPIO value {:?}", c as char))),
		}
	}
}

impl Drop for SysfsLine {
	fn drop(&mut self) {
		if let Err(e) = self.set(true) {
			warn!("couldn't release GPIO {}: {}", self.number, e);
		}
		if self.exported {
			debug!("unexporting GPIO {}", self.number);
			let r = fs::OpenOptions::new().write(true).open(self.base.join("unexport"))
				.and_then(|f| write_exact_at(&f, self.number.to_string().as_bytes()));
			if let Err(e) = r {
				warn!("couldn't unexport GPIO {}: {}", self.number, e);
			}
		}
	}
}

/// SCL and SDA on two GPIOs
pub struct SysfsLines {
	scl: SysfsLine,
	sda: SysfsLine,
}

impl SysfsLines {
	pub fn open_in(base: &Path, scl: u32, sda: u32) -> crate::AResult<Self> {
		ensure!(scl != sda, "SCL and SDA need different GPIOs (both {})", scl);
		Ok(SysfsLines {
			scl: SysfsLine::open_in(base, scl)?,
			sda: SysfsLine::open_in(base, sda)?,
		})
	}

	pub fn open(scl: u32, sda: u32) -> crate::AResult<Self> {
		Self::open_in(Path::new(SYSFS_GPIO), scl, sda)
	}
}

impl Lines for SysfsLines {
	fn set_scl(&mut self, release: bool) -> io::Result<()> {
		self.scl.set(release)
	}
	fn set_sda(&mut self, release: bool) -> io::Result<()> {
		self.sda.set(release)
	}
	fn read_scl(&mut self) -> io::Result<bool> {
		self.scl.get()
	}
	fn read_sda(&mut self) -> io::Result<bool> {
		self.sda.get()
	}
}
