//! Simulated 24LC01B behind a fake bus
//!
//! Implements `BusTransport` directly on the protocol level, records every
//! primitive call, and checks that the master follows the protocol
//! (violations are collected, not panicked on).

use crate::i2c::{
	Ack,
	BusTransport,
	CAPACITY,
	MAX_ADDRESS,
	PAGE_SIZE,
	Stalled,
};

/// A bus primitive as seen by the device
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Call {
	Start,
	Stop,
	RepeatedStart,
	Send(u8, Ack),
	Receive(u8),
	Ack,
	Nack,
}

impl Call {
	/// whether this is the master sending `control`
	pub fn is_control(&self, control: u8) -> bool {
		match *self {
			Call::Send(byte, _) => byte == control,
			_ => false,
		}
	}
}

/// Misbehaviour to inject
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct Faults {
	pub nack_address: bool,
	pub nack_read_control: bool,
	/// NACK the data byte at this offset of a write
	pub nack_data_at: Option<usize>,
	/// `receive_byte` reports a stalled bus
	pub stall_receive: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
enum State {
	Idle,
	// after START
	Control,
	// write mode, waiting for the memory address
	Address,
	// receiving data into the page buffer
	Write { start: u8, count: usize },
	// device NACKed, ignoring the bus until STOP or START
	Aborted,
	// device drives the next byte
	Read,
	// byte sent, waiting for ACK/NACK
	ReadAck,
	// NACK received, waiting for STOP
	ReadDone,
}

pub struct SimDevice {
	memory: [u8; CAPACITY],
	pointer: u8,
	state: State,
	pending: Vec<(u8, u8)>,
	present: bool,
	busy: u32,
	write_cycle_probes: u32,
	calls: Vec<Call>,
	violations: Vec<String>,
	pub faults: Faults,
}

impl Default for SimDevice {
	fn default() -> Self {
		SimDevice::new()
	}
}

impl SimDevice {
	/// erased device (all 0xff), finishing writes instantly
	pub fn new() -> Self {
		SimDevice {
			memory: [0xff; CAPACITY],
			pointer: 0,
			state: State::Idle,
			pending: Vec::new(),
			present: true,
			busy: 0,
			write_cycle_probes: 0,
			calls: Vec::new(),
			violations: Vec::new(),
			faults: Faults::default(),
		}
	}

	pub fn memory(&self) -> &[u8; CAPACITY] {
		&self.memory
	}

	pub fn memory_mut(&mut self) -> &mut [u8; CAPACITY] {
		&mut self.memory
	}

	/// an absent device never acknowledges
	pub fn set_present(&mut self, present: bool) {
		self.present = present;
	}

	/// number of control bytes the device NACKs after each write
	pub fn set_write_cycle_probes(&mut self, probes: u32) {
		self.write_cycle_probes = probes;
	}

	/// pretend a write cycle is in progress for the next `probes` control bytes
	pub fn start_write_cycle(&mut self, probes: u32) {
		self.busy = probes;
	}

	pub fn calls(&self) -> &[Call] {
		&self.calls
	}

	pub fn take_calls(&mut self) -> Vec<Call> {
		std::mem::replace(&mut self.calls, Vec::new())
	}

	/// protocol errors made by the master
	pub fn violations(&self) -> &[String] {
		&self.violations
	}

	fn violation(&mut self, msg: String) {
		warn!("simulated EEPROM: protocol violation: {}", msg);
		self.violations.push(msg);
	}

	fn control(&mut self, byte: u8) -> Ack {
		if !self.present || byte & 0xf0 != 0xa0 {
			self.state = State::Aborted;
			return Ack::Nack;
		}
		if self.busy > 0 {
			self.busy -= 1;
			self.state = State::Aborted;
			return Ack::Nack;
		}
		if 0 == byte & 0x01 {
			self.state = State::Address;
			Ack::Ack
		} else if self.faults.nack_read_control {
			self.state = State::Aborted;
			Ack::Nack
		} else {
			self.state = State::Read;
			Ack::Ack
		}
	}

	fn commit(&mut self) {
		if self.pending.is_empty() {
			return;
		}
		trace!("simulated EEPROM: committing {} byte(s)", self.pending.len());
		for (address, value) in self.pending.drain(..) {
			self.memory[address as usize] = value;
		}
		self.busy = self.write_cycle_probes;
	}
}

impl BusTransport for SimDevice {
	fn start(&mut self) -> Result<(), Stalled> {
		self.calls.push(Call::Start);
		match self.state {
			State::Read | State::ReadAck => {
				self.violation(format!("START while device drives data ({:?})", self.state));
			},
			_ => (),
		}
		// a START without STOP discards written data
		self.pending.clear();
		self.state = State::Control;
		Ok(())
	}

	fn stop(&mut self) -> Result<(), Stalled> {
		self.calls.push(Call::Stop);
		match self.state {
			State::Write { .. } => self.commit(),
			State::Read | State::ReadAck => {
				self.violation(format!("STOP while device drives data ({:?})", self.state));
			},
			_ => (),
		}
		self.pending.clear();
		self.state = State::Idle;
		Ok(())
	}

	fn repeated_start(&mut self) -> Result<(), Stalled> {
		self.calls.push(Call::RepeatedStart);
		match self.state {
			State::Write { count: 0, .. } => (),
			state => self.violation(format!("repeated START in state {:?}", state)),
		}
		self.pending.clear();
		self.state = State::Control;
		Ok(())
	}

	fn send_byte(&mut self, byte: u8) -> Result<Ack, Stalled> {
		let ack = match self.state {
			State::Control => self.control(byte),
			State::Address => {
				if self.faults.nack_address {
					self.state = State::Aborted;
					Ack::Nack
				} else {
					// 7-bit address counter; the MSB is ignored
					self.pointer = byte & MAX_ADDRESS;
					self.state = State::Write { start: self.pointer, count: 0 };
					Ack::Ack
				}
			},
			State::Write { start, count } => {
				if self.faults.nack_data_at == Some(count) {
					self.pending.clear();
					self.state = State::Aborted;
					Ack::Nack
				} else {
					// the page buffer wraps around at the page boundary
					let page = start as usize & !(PAGE_SIZE - 1);
					let address = page | ((start as usize + count) & (PAGE_SIZE - 1));
					self.pending.retain(|&(a, _)| a as usize != address);
					self.pending.push((address as u8, byte));
					self.pointer = (page | ((address + 1) & (PAGE_SIZE - 1))) as u8;
					self.state = State::Write { start, count: count + 1 };
					Ack::Ack
				}
			},
			State::Aborted => Ack::Nack,
			state => {
				self.violation(format!("sent 0x{:02x} in state {:?}", byte, state));
				Ack::Nack
			},
		};
		self.calls.push(Call::Send(byte, ack));
		Ok(ack)
	}

	fn receive_byte(&mut self) -> Result<u8, Stalled> {
		if self.faults.stall_receive {
			return Err(Stalled { what: "simulated receive stall" });
		}
		let byte = match self.state {
			State::Read => {
				let byte = self.memory[self.pointer as usize];
				// sequential reads wrap around at the end of the memory
				self.pointer = (self.pointer + 1) & MAX_ADDRESS;
				self.state = State::ReadAck;
				byte
			},
			state => {
				self.violation(format!("receive in state {:?}", state));
				// nobody drives SDA
				0xff
			},
		};
		self.calls.push(Call::Receive(byte));
		Ok(byte)
	}

	fn send_ack(&mut self) -> Result<(), Stalled> {
		self.calls.push(Call::Ack);
		match self.state {
			State::ReadAck => self.state = State::Read,
			state => self.violation(format!("ACK in state {:?}", state)),
		}
		Ok(())
	}

	fn send_nack(&mut self) -> Result<(), Stalled> {
		self.calls.push(Call::Nack);
		match self.state {
			State::ReadAck => self.state = State::ReadDone,
			state => self.violation(format!("NACK in state {:?}", state)),
		}
		Ok(())
	}
}
