use std::io;
use std::time::Duration;

use super::{
	Ack,
	BusTransport,
	Stalled,
	reliable_sleep,
};
use crate::config::{
	Config,
	WaitBudget,
};

/// Open drain bus lines
///
/// `true` releases a line (pulled up to HIGH), `false` drives it LOW.
pub trait Lines {
	fn set_scl(&mut self, release: bool) -> io::Result<()>;
	fn set_sda(&mut self, release: bool) -> io::Result<()>;
	fn read_scl(&mut self) -> io::Result<bool>;
	fn read_sda(&mut self) -> io::Result<bool>;
}

impl<'a, L: ?Sized + Lines> Lines for &'a mut L {
	fn set_scl(&mut self, release: bool) -> io::Result<()> {
		L::set_scl(*self, release)
	}
	fn set_sda(&mut self, release: bool) -> io::Result<()> {
		L::set_sda(*self, release)
	}
	fn read_scl(&mut self) -> io::Result<bool> {
		L::read_scl(*self)
	}
	fn read_sda(&mut self) -> io::Result<bool> {
		L::read_sda(*self)
	}
}

fn line<R>(result: io::Result<R>, what: &'static str) -> Result<R, Stalled> {
	result.map_err(|e| {
		error!("bus line access failed ({}): {}", what, e);
		Stalled { what }
	})
}

/// Bus master toggling SCL/SDA in software
///
/// Data changes while SCL is LOW and is sampled while SCL is HIGH; START
/// and STOP are SDA edges while SCL is HIGH. A slave may hold SCL LOW
/// ("clock stretching"), which is awaited within the wait budget.
pub struct BitBang<L: Lines> {
	lines: L,
	edge: Duration,
	wait: WaitBudget,
}

impl<L: Lines> BitBang<L> {
	pub fn new(lines: L, config: &Config) -> Self {
		BitBang {
			lines,
			edge: config.speed.clock_edge(),
			wait: config.wait,
		}
	}

	/// no delays between edges; for lines that are slow anyway (or fake)
	pub fn without_delay(lines: L, wait: WaitBudget) -> Self {
		BitBang {
			lines,
			edge: Duration::from_nanos(0),
			wait,
		}
	}

	// delay for (at least) one clock edge
	fn delay(&self) {
		if self.edge > Duration::from_nanos(0) {
			reliable_sleep(self.edge);
		}
	}

	fn sda(&mut self, release: bool) -> Result<(), Stalled> {
		line(self.lines.set_sda(release), "SDA write")
	}

	fn scl_low(&mut self) -> Result<(), Stalled> {
		line(self.lines.set_scl(false), "SCL write")
	}

	// release SCL and wait until it actually is HIGH
	fn scl_high(&mut self) -> Result<(), Stalled> {
		line(self.lines.set_scl(true), "SCL write")?;
		let lines = &mut self.lines;
		self.wait.wait_until("SCL release (clock stretching)", || line(lines.read_scl(), "SCL read"))
	}

	// SDA falling while SCL is HIGH
	fn start_condition(&mut self) -> Result<(), Stalled> {
		self.sda(true)?;
		self.delay();
		self.scl_high()?;
		self.delay();
		self.sda(false)?;
		self.delay();
		self.scl_low()?;
		self.delay();
		Ok(())
	}

	fn write_bit(&mut self, bit: bool) -> Result<(), Stalled> {
		self.sda(bit)?;
		self.delay();
		self.scl_high()?;
		self.delay();
		self.scl_low()
	}

	fn read_bit(&mut self) -> Result<bool, Stalled> {
		self.sda(true)?;
		self.delay();
		self.scl_high()?;
		self.delay();
		let bit = line(self.lines.read_sda(), "SDA read")?;
		self.scl_low()?;
		Ok(bit)
	}
}

impl<L: Lines> BusTransport for BitBang<L> {
	fn start(&mut self) -> Result<(), Stalled> {
		trace!("START");
		self.start_condition()
	}

	// SDA rising while SCL is HIGH
	fn stop(&mut self) -> Result<(), Stalled> {
		trace!("STOP");
		self.sda(false)?;
		self.delay();
		self.scl_high()?;
		self.delay();
		self.sda(true)?;
		self.delay();
		Ok(())
	}

	fn repeated_start(&mut self) -> Result<(), Stalled> {
		trace!("repeated START");
		self.start_condition()
	}

	fn send_byte(&mut self, byte: u8) -> Result<Ack, Stalled> {
		for bit in (0..8).rev() {
			self.write_bit(0 != byte & (1 << bit))?;
		}
		let ack = Ack::from(self.read_bit()?);
		trace!("sent 0x{:02x}: {:?}", byte, ack);
		Ok(ack)
	}

	fn receive_byte(&mut self) -> Result<u8, Stalled> {
		let mut result = 0u8;
		for bit in (0..8).rev() {
			if self.read_bit()? {
				result |= 1 << bit;
			}
		}
		trace!("received 0x{:02x}", result);
		Ok(result)
	}

	fn send_ack(&mut self) -> Result<(), Stalled> {
		self.write_bit(false)
	}

	fn send_nack(&mut self) -> Result<(), Stalled> {
		self.write_bit(true)
	}
}
