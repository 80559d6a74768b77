use std::thread;
use std::time::{
	Duration,
	Instant,
};

pub fn reliable_sleep(mut duration: Duration) {
	loop {
		let now = Instant::now();
		thread::sleep(duration);
		let elapsed = now.elapsed();
		if elapsed >= duration {
			return;
		}
		duration -= elapsed;
	}
}

/// Acknowledge bit sampled after sending a byte
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Ack {
	/// receiver pulled SDA low
	Ack,
	/// SDA stayed high
	Nack,
}

impl Ack {
	pub fn is_ack(self) -> bool {
		self == Ack::Ack
	}
}

impl From<bool> for Ack {
	// the sampled SDA level: low means acknowledged
	fn from(sda: bool) -> Self {
		match sda {
			false => Ack::Ack,
			true => Ack::Nack,
		}
	}
}

/// A bounded wait on the bus ran out (or the bus lines couldn't be accessed)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Fail)]
#[fail(display = "bus stalled: {}", what)]
pub struct Stalled {
	pub what: &'static str,
}

/// Primitive operations of a two-wire bus master.
///
/// Each call blocks until the bus stage completed; implementations must
/// bound their waits and report `Stalled` instead of hanging.
pub trait BusTransport {
	fn start(&mut self) -> Result<(), Stalled>;
	fn stop(&mut self) -> Result<(), Stalled>;
	fn repeated_start(&mut self) -> Result<(), Stalled>;

	/// send 8 bits (MSB first) and sample the receiver's acknowledge
	fn send_byte(&mut self, byte: u8) -> Result<Ack, Stalled>;
	/// clock in 8 bits; needs to be followed by `send_ack` or `send_nack`
	fn receive_byte(&mut self) -> Result<u8, Stalled>;

	/// request another byte
	fn send_ack(&mut self) -> Result<(), Stalled>;
	/// end of read
	fn send_nack(&mut self) -> Result<(), Stalled>;
}

impl<'a, T: ?Sized + BusTransport> BusTransport for &'a mut T {
	fn start(&mut self) -> Result<(), Stalled> {
		T::start(*self)
	}
	fn stop(&mut self) -> Result<(), Stalled> {
		T::stop(*self)
	}
	fn repeated_start(&mut self) -> Result<(), Stalled> {
		T::repeated_start(*self)
	}

	fn send_byte(&mut self, byte: u8) -> Result<Ack, Stalled> {
		T::send_byte(*self, byte)
	}
	fn receive_byte(&mut self) -> Result<u8, Stalled> {
		T::receive_byte(*self)
	}

	fn send_ack(&mut self) -> Result<(), Stalled> {
		T::send_ack(*self)
	}
	fn send_nack(&mut self) -> Result<(), Stalled> {
		T::send_nack(*self)
	}
}
