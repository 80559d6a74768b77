//! Protocol for Microchip 24LC01B, a 1-kbit EEPROM (organized as 128 x 8bit)
//!
//! Two-wire bus (SCL + SDA, open drain). Every transaction starts with a
//! START condition followed by the control byte:
//! - 0b1010: device type
//! - 3 bits: chip select (don't care on the 24LC01B, we send 0b000)
//! - R/W bit: 0 = write, 1 = read
//!
//! Writes: START, 0xa0, memory address, 1..8 data bytes, STOP. The device
//! starts its internal write cycle on STOP and doesn't acknowledge its
//! control byte until the cycle is done ("acknowledge polling").
//!
//! Reads: START, 0xa0, memory address (sets the address pointer), repeated
//! START, 0xa1, then the device sends data bytes as long as the master
//! acknowledges them; the last byte gets a NACK, followed by STOP.
//!
//! A page write wraps around at the page (8 byte) boundary; a sequential
//! read wraps around at the end of the memory.

mod bitbang;
mod object;
mod operations;
mod session;
mod transport;

pub use self::bitbang::{
	BitBang,
	Lines,
};

pub use self::object::Object;

pub use self::operations::{
	Eeprom,
	SequentialReader,
};

pub use self::session::{
	Session,
	poll_until_ready,
};

pub use self::transport::{
	Ack,
	BusTransport,
	Stalled,
	reliable_sleep,
};

pub const CONTROL_WRITE: u8 = 0xa0;
pub const CONTROL_READ: u8 = 0xa1;
pub const PAGE_SIZE: usize = 8;
pub const CAPACITY: usize = 128;
pub const MAX_ADDRESS: u8 = 0x7f;
