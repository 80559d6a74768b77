use crate::i2c::Stalled;

/// Failure of an EEPROM operation.
///
/// Success is `Ok(..)`; as a numeric status code (see `status_code`)
/// success is `STATUS_OK`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Fail)]
pub enum EepromError {
	/// precondition failure, detected before any bus activity
	#[fail(display = "address 0x{:02x} (length {}) out of bounds", address, len)]
	AddressOutOfBounds {
		address: u8,
		len: usize,
	},
	/// device didn't acknowledge its control byte (absent, or still busy
	/// after acknowledge polling gave up)
	#[fail(display = "no acknowledge for control byte 0x{:02x}", control)]
	ControlByteNack {
		control: u8,
	},
	#[fail(display = "no acknowledge for memory address 0x{:02x}", address)]
	MemoryAddressNack {
		address: u8,
	},
	/// data byte of a byte or page write not acknowledged, or the bus
	/// stalled during the data phase
	#[fail(display = "no acknowledge for data at offset {} of write to 0x{:02x}", offset, address)]
	PageNack {
		address: u8,
		offset: usize,
	},
}

pub const STATUS_OK: u8 = 0x00;

impl EepromError {
	/// numeric status code (0xe0..0xe3)
	pub fn code(&self) -> u8 {
		match self {
			EepromError::AddressOutOfBounds { .. } => 0xe0,
			EepromError::ControlByteNack { .. } => 0xe1,
			EepromError::MemoryAddressNack { .. } => 0xe2,
			EepromError::PageNack { .. } => 0xe3,
		}
	}

	pub(crate) fn out_of_bounds(address: u8, len: usize) -> Self {
		EepromError::AddressOutOfBounds { address, len }
	}
}

/// status code of an operation result (`STATUS_OK` on success)
pub fn status_code<T>(result: &Result<T, EepromError>) -> u8 {
	match result {
		Ok(_) => STATUS_OK,
		Err(e) => e.code(),
	}
}

/// Which phase of a transaction a NACK or stall happened in; decides the
/// reported error.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub(crate) enum Phase {
	Control(u8),
	Address(u8),
	Data { address: u8, offset: usize },
}

impl Phase {
	pub(crate) fn error(self) -> EepromError {
		match self {
			Phase::Control(control) => EepromError::ControlByteNack { control },
			Phase::Address(address) => EepromError::MemoryAddressNack { address },
			Phase::Data { address, offset } => EepromError::PageNack { address, offset },
		}
	}

	pub(crate) fn stalled(self, stall: Stalled) -> EepromError {
		debug!("bus stalled ({}) during {:?}", stall, self);
		self.error()
	}
}
