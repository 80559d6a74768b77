use super::{
	Ack,
	BusTransport,
	CONTROL_READ,
	CONTROL_WRITE,
	Stalled,
};
use crate::error::{
	EepromError,
	Phase,
};

/// An open bus transaction.
///
/// Holds the only (mutable) borrow of the transport from the START
/// condition until `close` sent STOP; dropping an unclosed session sends
/// STOP too, so a failed operation doesn't leave the bus claimed.
pub struct Session<'a, T: ?Sized + BusTransport + 'a> {
	bus: &'a mut T,
	open: bool,
}

impl<'a, T: ?Sized + BusTransport> Session<'a, T> {
	/// START, control byte (write mode) and memory address byte
	///
	/// Reads need this too: it loads the device's address pointer.
	pub fn open(bus: &'a mut T, address: u8) -> Result<Self, EepromError> {
		trace!("framing memory address 0x{:02x}", address);
		bus.start().map_err(|e| Phase::Control(CONTROL_WRITE).stalled(e))?;

		let mut session = Session {
			bus,
			open: true,
		};
		session.send(CONTROL_WRITE, Phase::Control(CONTROL_WRITE))?;
		session.send(address, Phase::Address(address))?;
		Ok(session)
	}

	/// session that never started; touches no bus
	pub(crate) fn closed(bus: &'a mut T) -> Self {
		Session {
			bus,
			open: false,
		}
	}

	pub(crate) fn send(&mut self, byte: u8, phase: Phase) -> Result<(), EepromError> {
		match self.bus.send_byte(byte) {
			Ok(Ack::Ack) => Ok(()),
			Ok(Ack::Nack) => {
				debug!("no acknowledge for 0x{:02x} during {:?}", byte, phase);
				Err(phase.error())
			},
			Err(e) => Err(phase.stalled(e)),
		}
	}

	/// switch to reading: repeated START and control byte (read mode)
	pub fn turn_around(&mut self) -> Result<(), EepromError> {
		let phase = Phase::Control(CONTROL_READ);
		self.bus.repeated_start().map_err(|e| phase.stalled(e))?;
		self.send(CONTROL_READ, phase)
	}

	/// receive a byte; acknowledge it unless it is the `last` one
	pub(crate) fn receive(&mut self, last: bool, phase: Phase) -> Result<u8, EepromError> {
		let byte = self.bus.receive_byte().map_err(|e| phase.stalled(e))?;
		let acknowledge = if last {
			self.bus.send_nack()
		} else {
			self.bus.send_ack()
		};
		acknowledge.map_err(|e| phase.stalled(e))?;
		Ok(byte)
	}

	/// STOP; for writes this starts the device's write cycle
	pub(crate) fn close(mut self, phase: Phase) -> Result<(), EepromError> {
		self.finish(phase)
	}

	pub(crate) fn is_open(&self) -> bool {
		self.open
	}

	pub(crate) fn finish(&mut self, phase: Phase) -> Result<(), EepromError> {
		self.open = false;
		self.bus.stop().map_err(|e| phase.stalled(e))
	}
}

impl<'a, T: ?Sized + BusTransport> Drop for Session<'a, T> {
	fn drop(&mut self) {
		if self.open {
			if let Err(e) = self.bus.stop() {
				warn!("Couldn't release bus after failed transaction: {}", e);
			}
		}
	}
}

// START, control byte (write mode), STOP
fn probe<T: ?Sized + BusTransport>(bus: &mut T) -> Result<Ack, Stalled> {
	bus.start()?;
	let ack = bus.send_byte(CONTROL_WRITE);
	let stop = bus.stop();
	let ack = ack?;
	stop?;
	Ok(ack)
}

/// Acknowledge polling: wait for the device to finish its write cycle.
///
/// A busy device doesn't acknowledge its control byte; probe up to `limit`
/// times and return the number of probes needed.
pub fn poll_until_ready<T: ?Sized + BusTransport>(bus: &mut T, limit: u32) -> Result<u32, EepromError> {
	for attempt in 1..=limit {
		match probe(bus) {
			Ok(Ack::Ack) => {
				trace!("write cycle done after {} probe(s)", attempt);
				return Ok(attempt);
			},
			Ok(Ack::Nack) => trace!("device busy (probe {})", attempt),
			Err(e) => debug!("probe {} failed: {}", attempt, e),
		}
	}
	warn!("device still busy after {} acknowledge polling probes", limit);
	Err(Phase::Control(CONTROL_WRITE).error())
}
