use std::cmp;

use super::{
	BusTransport,
	MAX_ADDRESS,
	Object,
	PAGE_SIZE,
	Session,
	poll_until_ready,
};
use crate::config::{
	BoundsPolicy,
	Config,
};
use crate::error::{
	EepromError,
	Phase,
};

/// 24LC01B on a bus
///
/// Every operation is a live bus transaction; nothing is cached.
pub struct Eeprom<T: BusTransport> {
	bus: T,
	config: Config,
}

impl<T: BusTransport> Eeprom<T> {
	pub fn new(bus: T) -> Self {
		Self::with_config(bus, Config::default())
	}

	pub fn with_config(bus: T, config: Config) -> Self {
		Eeprom { bus, config }
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn bus(&self) -> &T {
		&self.bus
	}

	pub fn bus_mut(&mut self) -> &mut T {
		&mut self.bus
	}

	pub fn into_inner(self) -> T {
		self.bus
	}

	fn check_address(address: u8) -> Result<(), EepromError> {
		if address > MAX_ADDRESS {
			debug!("rejecting address 0x{:02x}", address);
			return Err(EepromError::out_of_bounds(address, 1));
		}
		Ok(())
	}

	fn check_span(policy: BoundsPolicy, address: u8, len: usize) -> Result<(), EepromError> {
		if !policy.allows(address, len) {
			debug!("rejecting {} bytes at 0x{:02x} ({:?} bounds)", len, address, policy);
			return Err(EepromError::out_of_bounds(address, len));
		}
		Ok(())
	}

	/// wait for the end of the write cycle; returns the number of probes
	pub fn poll_until_ready(&mut self) -> Result<u32, EepromError> {
		poll_until_ready(&mut self.bus, self.config.poll_limit)
	}

	// one framed write, followed by acknowledge polling
	fn write_transaction(&mut self, address: u8, data: &[u8]) -> Result<(), EepromError> {
		{
			let mut session = Session::open(&mut self.bus, address)?;
			for (offset, &byte) in data.iter().enumerate() {
				session.send(byte, Phase::Data { address, offset })?;
			}
			session.close(Phase::Data { address, offset: data.len() })?;
		}
		self.poll_until_ready()?;
		Ok(())
	}

	/// write a single byte; returns after the write cycle completed
	pub fn write_byte(&mut self, address: u8, value: u8) -> Result<(), EepromError> {
		Self::check_address(address)?;
		debug!("write byte 0x{:02x} to 0x{:02x}", value, address);
		self.write_transaction(address, &[value])
	}

	/// random access read of a single byte
	pub fn read_byte(&mut self, address: u8) -> Result<u8, EepromError> {
		Self::check_address(address)?;
		let mut reader = self.reader(address, 1)?;
		let value = reader.read_byte()?;
		debug!("read byte 0x{:02x} from 0x{:02x}", value, address);
		Ok(value)
	}

	/// write up to `PAGE_SIZE` bytes in a single transaction
	///
	/// The device wraps around at page boundaries; the start address doesn't
	/// need to be aligned, but spans crossing a boundary overwrite the
	/// beginning of the page. Bytes already sent when the bus fails are not
	/// rolled back.
	pub fn write_page(&mut self, address: u8, data: &[u8]) -> Result<(), EepromError> {
		if data.len() > PAGE_SIZE {
			debug!("rejecting page write of {} bytes", data.len());
			return Err(EepromError::out_of_bounds(address, data.len()));
		}
		Self::check_span(self.config.bounds, address, data.len())?;
		if data.is_empty() {
			return Ok(());
		}
		debug!("write page of {} bytes to 0x{:02x}", data.len(), address);
		self.write_transaction(address, data)
	}

	/// start a sequential read of `len` bytes (address not validated)
	fn reader(&mut self, address: u8, len: usize) -> Result<SequentialReader<T>, EepromError> {
		let mut session = Session::open(&mut self.bus, address)?;
		session.turn_around()?;
		Ok(SequentialReader {
			session,
			address,
			offset: 0,
			len,
			failed: false,
		})
	}

	/// read `target.len()` bytes starting at `address` in one transaction
	pub fn read_sequence(&mut self, address: u8, target: &mut [u8]) -> Result<(), EepromError> {
		Self::check_span(self.config.bounds, address, target.len())?;
		if target.is_empty() {
			return Ok(());
		}
		debug!("read {} bytes from 0x{:02x}", target.len(), address);
		let mut reader = self.reader(address, target.len())?;
		reader.read(target)
	}

	/// sequential reader for `len` bytes starting at `address`
	pub fn read_iter(&mut self, address: u8, len: usize) -> Result<SequentialReader<T>, EepromError> {
		Self::check_span(self.config.bounds, address, len)?;
		if 0 == len {
			return Ok(SequentialReader {
				session: Session::closed(&mut self.bus),
				address,
				offset: 0,
				len,
				failed: false,
			});
		}
		self.reader(address, len)
	}

	/// write `data` byte by byte (one write cycle per byte)
	pub fn write_object_bytes(&mut self, address: u8, data: &[u8]) -> Result<(), EepromError> {
		Self::check_span(self.config.bounds, address, data.len())?;
		for (offset, &byte) in data.iter().enumerate() {
			// past the end of memory under legacy bounds: write_byte rejects it
			let target = (address as usize + offset) as u8;
			self.write_byte(target, byte)?;
		}
		Ok(())
	}

	/// read `target.len()` bytes with one random access read each
	pub fn read_object_bytes(&mut self, address: u8, target: &mut [u8]) -> Result<(), EepromError> {
		Self::check_span(self.config.bounds, address, target.len())?;
		for (offset, t) in target.iter_mut().enumerate() {
			*t = self.read_byte((address as usize + offset) as u8)?;
		}
		Ok(())
	}

	pub fn write_object<O: Object>(&mut self, address: u8, value: &O) -> Result<(), EepromError> {
		let mut buf = vec![0u8; O::SIZE];
		value.store(&mut buf);
		debug!("write {}-byte object to 0x{:02x}", O::SIZE, address);
		self.write_object_bytes(address, &buf)
	}

	pub fn read_object<O: Object>(&mut self, address: u8) -> Result<O, EepromError> {
		let mut buf = vec![0u8; O::SIZE];
		self.read_object_bytes(address, &mut buf)?;
		Ok(O::load(&buf))
	}

	/// write an arbitrary span with page writes split at page boundaries
	///
	/// Always checked strictly: a block can't wrap around.
	pub fn write_block(&mut self, address: u8, data: &[u8]) -> Result<(), EepromError> {
		Self::check_span(BoundsPolicy::Strict, address, data.len())?;
		let mut address = address as usize;
		let mut rest = data;
		while !rest.is_empty() {
			let room = PAGE_SIZE - address % PAGE_SIZE;
			let (chunk, tail) = rest.split_at(cmp::min(room, rest.len()));
			self.write_page(address as u8, chunk)?;
			address += chunk.len();
			rest = tail;
		}
		Ok(())
	}
}

/// Sequential read in progress
///
/// Every byte but the last is acknowledged to request the next one; the
/// last byte gets a NACK and the transaction ends with STOP.
pub struct SequentialReader<'a, T: BusTransport + 'a> {
	session: Session<'a, T>,
	address: u8,
	offset: usize,
	len: usize,
	failed: bool,
}

impl<'a, T: BusTransport> SequentialReader<'a, T> {
	pub fn remaining(&self) -> usize {
		self.len - self.offset
	}

	pub fn read_byte(&mut self) -> Result<u8, EepromError> {
		if 0 == self.remaining() {
			debug!("sequential read of {} bytes at 0x{:02x} already complete", self.len, self.address);
			return Err(EepromError::out_of_bounds(self.address, self.len + 1));
		}
		let phase = Phase::Data { address: self.address, offset: self.offset };
		self.offset += 1;
		let last = self.offset == self.len;
		let byte = self.session.receive(last, phase).map_err(|e| {
			self.failed = true;
			e
		})?;
		if last {
			self.session.finish(phase)?;
		}
		Ok(byte)
	}

	/// fails without bus activity if `target` is longer than `remaining()`
	pub fn read(&mut self, target: &mut [u8]) -> Result<(), EepromError> {
		if target.len() > self.remaining() {
			debug!("can't read {} more bytes, {} remaining", target.len(), self.remaining());
			return Err(EepromError::out_of_bounds(self.address, self.offset + target.len()));
		}
		for t in target.iter_mut() {
			*t = self.read_byte()?;
		}
		Ok(())
	}
}

impl<'a, T: BusTransport> Iterator for SequentialReader<'a, T> {
	type Item = Result<u8, EepromError>;

	fn next(&mut self) -> Option<Self::Item> {
		if 0 == self.remaining() {
			return None;
		}
		Some(self.read_byte())
	}
}

impl<'a, T: BusTransport> Drop for SequentialReader<'a, T> {
	fn drop(&mut self) {
		// the device drives the next byte after its control byte or an ACK;
		// clock it out and NACK it before the session sends STOP
		if !self.failed && self.session.is_open() {
			let phase = Phase::Data { address: self.address, offset: self.offset };
			if let Err(e) = self.session.receive(true, phase) {
				warn!("Couldn't terminate sequential read: {}", e);
			}
		}
	}
}

#[cfg(test)]
mod test {
	use super::Eeprom;
	use crate::config::{
		BoundsPolicy,
		Config,
	};
	use crate::error::EepromError;
	use crate::i2c::{
		Ack,
		CONTROL_READ,
		CONTROL_WRITE,
	};
	use crate::sim::{
		Call,
		SimDevice,
	};

	fn eeprom() -> Eeprom<SimDevice> {
		Eeprom::new(SimDevice::new())
	}

	fn strict() -> Eeprom<SimDevice> {
		Eeprom::with_config(SimDevice::new(), Config {
			bounds: BoundsPolicy::Strict,
			..Config::default()
		})
	}

	#[test]
	fn out_of_bounds_touches_no_bus() {
		let mut ee = eeprom();
		for address in 0x80..=0xff {
			assert_eq!(ee.write_byte(address, 0x00), Err(EepromError::out_of_bounds(address, 1)));
			assert_eq!(ee.read_byte(address), Err(EepromError::out_of_bounds(address, 1)));
		}
		assert!(ee.bus().calls().is_empty());
	}

	#[test]
	fn byte_round_trip() {
		let mut ee = eeprom();
		ee.write_byte(0x00, 0x45).unwrap();
		assert_eq!(ee.read_byte(0x00).unwrap(), 0x45);
		ee.write_byte(0x7f, 0xa5).unwrap();
		assert_eq!(ee.read_byte(0x7f).unwrap(), 0xa5);
		assert_eq!(ee.bus().memory()[0x00], 0x45);
	}

	#[test]
	fn write_byte_sequence() {
		let mut ee = eeprom();
		ee.bus_mut().set_write_cycle_probes(2);
		ee.write_byte(0x05, 0x99).unwrap();
		assert_eq!(ee.bus_mut().take_calls(), vec![
			Call::Start,
			Call::Send(CONTROL_WRITE, Ack::Ack),
			Call::Send(0x05, Ack::Ack),
			Call::Send(0x99, Ack::Ack),
			Call::Stop,
			// acknowledge polling
			Call::Start,
			Call::Send(CONTROL_WRITE, Ack::Nack),
			Call::Stop,
			Call::Start,
			Call::Send(CONTROL_WRITE, Ack::Nack),
			Call::Stop,
			Call::Start,
			Call::Send(CONTROL_WRITE, Ack::Ack),
			Call::Stop,
		]);
	}

	#[test]
	fn read_byte_sequence() {
		let mut ee = eeprom();
		ee.bus_mut().memory_mut()[0x33] = 0x5a;
		assert_eq!(ee.read_byte(0x33).unwrap(), 0x5a);
		assert_eq!(ee.bus_mut().take_calls(), vec![
			Call::Start,
			Call::Send(CONTROL_WRITE, Ack::Ack),
			Call::Send(0x33, Ack::Ack),
			Call::RepeatedStart,
			Call::Send(CONTROL_READ, Ack::Ack),
			Call::Receive(0x5a),
			Call::Nack,
			Call::Stop,
		]);
	}

	#[test]
	fn object_round_trip() {
		let mut ee = eeprom();
		let pi = 3.14f32;
		ee.write_object(0x00, &pi).unwrap();
		let x: f32 = ee.read_object(0x00).unwrap();
		assert_eq!(x.to_bits(), pi.to_bits());

		let mut raw = [0u8; 4];
		ee.read_object_bytes(0x00, &mut raw).unwrap();
		assert_eq!(raw, pi.to_le_bytes());

		let big = 1844674407370955161u64;
		ee.write_object(0x10, &big).unwrap();
		assert_eq!(ee.read_object::<u64>(0x10).unwrap(), big);
	}

	#[test]
	fn object_pays_one_write_cycle_per_byte() {
		let mut ee = eeprom();
		ee.bus_mut().set_write_cycle_probes(1);
		ee.write_object(0x20, &0x1234_5678u32).unwrap();
		let calls = ee.bus_mut().take_calls();
		// per byte: framing + one busy probe + one successful probe
		assert_eq!(calls.iter().filter(|c| c.is_control(CONTROL_WRITE)).count(), 4 * 3);
		assert_eq!(&ee.bus().memory()[0x20..0x24], &[0x78, 0x56, 0x34, 0x12]);
	}

	#[test]
	fn object_past_end_of_memory() {
		let mut ee = eeprom();
		// legacy bounds accept the span, the byte at 0x80 is rejected
		assert_eq!(ee.write_object(0x7e, &0xaabb_ccddu32), Err(EepromError::out_of_bounds(0x80, 1)));
		assert_eq!(&ee.bus().memory()[0x7e..], &[0xdd, 0xcc]);

		let mut ee = strict();
		assert_eq!(ee.write_object(0x7e, &0xaabb_ccddu32), Err(EepromError::out_of_bounds(0x7e, 4)));
		assert!(ee.bus().calls().is_empty());
	}

	#[test]
	fn page_round_trip() {
		let mut ee = eeprom();
		ee.write_page(0x00, &[0, 1, 2, 3, 4, 5, 6, 7]).unwrap();
		let mut buf = [0xffu8; 8];
		ee.read_sequence(0x00, &mut buf).unwrap();
		assert_eq!(buf, [0, 1, 2, 3, 4, 5, 6, 7]);
	}

	#[test]
	fn page_is_one_transaction() {
		let mut ee = eeprom();
		ee.bus_mut().set_write_cycle_probes(4);
		ee.write_page(0x08, &[9, 8, 7]).unwrap();
		let calls = ee.bus_mut().take_calls();
		assert_eq!(&calls[..7], &[
			Call::Start,
			Call::Send(CONTROL_WRITE, Ack::Ack),
			Call::Send(0x08, Ack::Ack),
			Call::Send(9, Ack::Ack),
			Call::Send(8, Ack::Ack),
			Call::Send(7, Ack::Ack),
			Call::Stop,
		][..]);
		// framing + single polling run for the whole page
		assert_eq!(calls.iter().filter(|c| c.is_control(CONTROL_WRITE)).count(), 1 + 5);
	}

	#[test]
	fn page_too_long() {
		let mut ee = eeprom();
		assert_eq!(ee.write_page(0x00, &[0u8; 9]), Err(EepromError::out_of_bounds(0x00, 9)));
		assert!(ee.bus().calls().is_empty());
	}

	#[test]
	fn empty_spans_touch_no_bus() {
		let mut ee = eeprom();
		ee.write_page(0x10, &[]).unwrap();
		ee.read_sequence(0x10, &mut []).unwrap();
		assert!(ee.bus().calls().is_empty());
		assert_eq!(ee.write_page(0x80, &[]), Err(EepromError::out_of_bounds(0x80, 0)));

		{
			let mut reader = ee.read_iter(0x10, 0).unwrap();
			assert_eq!(reader.remaining(), 0);
			assert!(reader.next().is_none());
		}
		assert!(ee.bus().calls().is_empty());
	}

	#[test]
	fn legacy_bounds_pass_start_past_end() {
		let mut ee = eeprom();
		// 0x80 <= 0x7f + 1; the device ignores the address MSB
		ee.write_page(0x80, &[0x5a]).unwrap();
		assert_eq!(ee.bus().memory()[0x00], 0x5a);
		let mut buf = [0u8; 8];
		ee.read_sequence(0x87, &mut buf).unwrap();
		assert_eq!(ee.write_page(0x88, &[0u8; 8]), Err(EepromError::out_of_bounds(0x88, 8)));

		let mut ee = strict();
		assert_eq!(ee.write_page(0x80, &[0x5a]), Err(EepromError::out_of_bounds(0x80, 1)));
		assert!(ee.bus().calls().is_empty());
	}

	#[test]
	fn reader_refuses_to_read_past_its_length() {
		let mut ee = eeprom();
		ee.write_page(0x30, &[7, 8]).unwrap();
		let mut reader = ee.read_iter(0x30, 2).unwrap();
		let mut buf = [0u8; 3];
		assert_eq!(reader.read(&mut buf), Err(EepromError::out_of_bounds(0x30, 3)));
		assert_eq!(reader.remaining(), 2);
		reader.read(&mut buf[..2]).unwrap();
		assert_eq!(&buf[..2], &[7, 8]);
		assert_eq!(reader.read_byte(), Err(EepromError::out_of_bounds(0x30, 3)));
		drop(reader);
		assert!(ee.bus().violations().is_empty());
	}

	#[test]
	fn legacy_bounds_accept_overrun() {
		let mut ee = eeprom();
		let data = [0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17];
		// 0x7d <= 0x7f + 8: accepted, although 0x80.. don't exist
		ee.write_page(0x7d, &data).unwrap();
		// the device wraps around within the page 0x78..0x7f
		assert_eq!(&ee.bus().memory()[0x78..], &[0x13, 0x14, 0x15, 0x16, 0x17, 0x10, 0x11, 0x12]);

		let mut buf = [0u8; 8];
		ee.read_sequence(0x7d, &mut buf).unwrap();
		// sequential reads wrap around at the end of the memory
		assert_eq!(buf, [0x10, 0x11, 0x12, 0xff, 0xff, 0xff, 0xff, 0xff]);
	}

	#[test]
	fn strict_bounds_reject_overrun() {
		let mut ee = strict();
		assert_eq!(ee.write_page(0x7d, &[0u8; 8]), Err(EepromError::out_of_bounds(0x7d, 8)));
		let mut buf = [0u8; 8];
		assert_eq!(ee.read_sequence(0x7d, &mut buf), Err(EepromError::out_of_bounds(0x7d, 8)));
		assert!(ee.bus().calls().is_empty());
		ee.write_page(0x78, &[0u8; 8]).unwrap();
		ee.read_sequence(0x78, &mut buf).unwrap();
	}

	#[test]
	fn read_ack_discipline() {
		for &len in &[1usize, 2, 8, 128] {
			let mut ee = eeprom();
			let mut buf = vec![0u8; len];
			ee.read_sequence(0x00, &mut buf).unwrap();
			let calls = ee.bus_mut().take_calls();
			let acks: Vec<&Call> = calls.iter()
				.filter(|c| **c == Call::Ack || **c == Call::Nack)
				.collect();
			assert_eq!(acks.len(), len);
			assert!(acks[..len - 1].iter().all(|c| **c == Call::Ack));
			assert_eq!(*acks[len - 1], Call::Nack);
			assert_eq!(calls[calls.len() - 2..], [Call::Nack, Call::Stop]);
		}
	}

	#[test]
	fn full_memory_round_trip() {
		let mut ee = eeprom();
		let data: Vec<u8> = (0..128u8).collect();
		for (page, chunk) in data.chunks(8).enumerate() {
			ee.write_page((page * 8) as u8, chunk).unwrap();
		}
		let mut buf = [0u8; 128];
		ee.read_sequence(0x00, &mut buf).unwrap();
		assert_eq!(&buf[..], &data[..]);
	}

	#[test]
	fn block_splits_at_page_boundaries() {
		let mut ee = eeprom();
		let data: Vec<u8> = (0x40..0x54u8).collect();
		ee.write_block(0x05, &data).unwrap();
		let calls = ee.bus_mut().take_calls();
		// pages 0x05..0x08, 0x08..0x10, 0x10..0x18, 0x18..0x19
		let framed: Vec<u8> = calls.windows(2)
			.filter_map(|w| match (&w[0], &w[1]) {
				(Call::Send(CONTROL_WRITE, Ack::Ack), Call::Send(address, Ack::Ack)) => Some(*address),
				_ => None,
			})
			.collect();
		assert_eq!(framed, vec![0x05, 0x08, 0x10, 0x18]);
		assert_eq!(&ee.bus().memory()[0x05..0x19], &data[..]);

		assert_eq!(ee.write_block(0x7d, &[0u8; 4]), Err(EepromError::out_of_bounds(0x7d, 4)));
		ee.write_block(0x00, &[0x11; 128]).unwrap();
		assert!(ee.bus().memory().iter().all(|&b| b == 0x11));
	}

	#[test]
	fn reader_iterator() {
		let mut ee = eeprom();
		ee.write_page(0x20, &[1, 2, 3, 4]).unwrap();
		let bytes: Result<Vec<u8>, _> = ee.read_iter(0x20, 4).unwrap().collect();
		assert_eq!(bytes.unwrap(), vec![1, 2, 3, 4]);
	}

	#[test]
	fn reader_dropped_early_terminates_read() {
		let mut ee = eeprom();
		{
			let mut reader = ee.read_iter(0x00, 4).unwrap();
			reader.read_byte().unwrap();
			assert_eq!(reader.remaining(), 3);
		}
		let calls = ee.bus_mut().take_calls();
		assert_eq!(calls[calls.len() - 5..], [
			Call::Receive(0xff),
			Call::Ack,
			Call::Receive(0xff),
			Call::Nack,
			Call::Stop,
		]);
		assert!(ee.bus().violations().is_empty());
	}

	#[test]
	fn nack_errors_are_reported() {
		let mut ee = eeprom();
		ee.bus_mut().set_present(false);
		assert_eq!(ee.write_byte(0x00, 1), Err(EepromError::ControlByteNack { control: CONTROL_WRITE }));
		assert_eq!(ee.read_byte(0x00), Err(EepromError::ControlByteNack { control: CONTROL_WRITE }));

		let mut ee = eeprom();
		ee.bus_mut().faults.nack_read_control = true;
		assert_eq!(ee.read_byte(0x00), Err(EepromError::ControlByteNack { control: CONTROL_READ }));

		let mut ee = eeprom();
		ee.bus_mut().faults.nack_address = true;
		assert_eq!(ee.write_byte(0x21, 1), Err(EepromError::MemoryAddressNack { address: 0x21 }));

		let mut ee = eeprom();
		ee.bus_mut().faults.nack_data_at = Some(2);
		assert_eq!(ee.write_page(0x00, &[1, 2, 3, 4]), Err(EepromError::PageNack { address: 0x00, offset: 2 }));
		// bus released, nothing committed without a regular STOP after the data
		assert_eq!(ee.bus_mut().take_calls().last(), Some(&Call::Stop));

		let mut ee = eeprom();
		ee.bus_mut().set_write_cycle_probes(u32::max_value());
		assert_eq!(ee.write_byte(0x00, 1), Err(EepromError::ControlByteNack { control: CONTROL_WRITE }));
	}

	#[test]
	fn stalled_receive_is_reported() {
		let mut ee = eeprom();
		ee.bus_mut().faults.stall_receive = true;
		let mut buf = [0u8; 3];
		assert_eq!(ee.read_sequence(0x04, &mut buf), Err(EepromError::PageNack { address: 0x04, offset: 0 }));
		assert_eq!(ee.bus_mut().take_calls().last(), Some(&Call::Stop));
	}
}
