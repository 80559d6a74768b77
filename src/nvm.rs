//! Word-oriented non-volatile store
//!
//! Models the microcontroller's data EEPROM the demo copies the external
//! EEPROM into: 256 16-bit words, addressed by (even) byte offsets. Bits can
//! only be cleared by programming; erasing sets words to 0xffff.

pub const WORD_LEN: u16 = 2;
pub const WORD_COUNT: usize = 256;
/// byte offset of the last word
pub const OFFSET_LAST: u16 = (WORD_COUNT as u16 - 1) * WORD_LEN;

pub const ERASED: u16 = 0xffff;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum EraseSize {
	One,
	Four,
	Eight,
	/// whole store; offset is ignored
	Bulk,
}

impl EraseSize {
	pub fn words(self) -> usize {
		match self {
			EraseSize::One => 1,
			EraseSize::Four => 4,
			EraseSize::Eight => 8,
			EraseSize::Bulk => WORD_COUNT,
		}
	}
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum WriteMode {
	/// erase the word before programming it
	EraseFirst,
	/// only program (word must have been erased already, otherwise bits
	/// already cleared stay cleared)
	ProgramOnly,
}

fn word_index(offset: u16) -> crate::AResult<usize> {
	ensure!(offset % WORD_LEN == 0, "unaligned word offset {}", offset);
	ensure!(offset <= OFFSET_LAST, "word offset {} out of range", offset);
	Ok((offset / WORD_LEN) as usize)
}

pub trait WordStore {
	fn erase(&mut self, size: EraseSize, offset: u16) -> crate::AResult<()>;
	fn read(&mut self, offset: u16) -> crate::AResult<u16>;
	fn write(&mut self, mode: WriteMode, offset: u16, word: u16) -> crate::AResult<()>;

	/// read `target.len()` words starting at `offset`
	fn read_seq(&mut self, offset: u16, target: &mut [u16]) -> crate::AResult<()> {
		let first = word_index(offset)?;
		ensure!(first + target.len() <= WORD_COUNT, "reading {} words at offset {} out of range", target.len(), offset);
		for (i, t) in target.iter_mut().enumerate() {
			*t = self.read(offset + i as u16 * WORD_LEN)?;
		}
		Ok(())
	}

	/// write `words` starting at `offset`
	fn write_seq(&mut self, mode: WriteMode, offset: u16, words: &[u16]) -> crate::AResult<()> {
		let first = word_index(offset)?;
		ensure!(first + words.len() <= WORD_COUNT, "writing {} words at offset {} out of range", words.len(), offset);
		for (i, &w) in words.iter().enumerate() {
			self.write(mode, offset + i as u16 * WORD_LEN, w)?;
		}
		Ok(())
	}
}

/// In-memory word store
pub struct MemoryWordStore {
	words: [u16; WORD_COUNT],
}

impl Default for MemoryWordStore {
	fn default() -> Self {
		MemoryWordStore::new()
	}
}

impl MemoryWordStore {
	pub fn new() -> Self {
		MemoryWordStore {
			words: [ERASED; WORD_COUNT],
		}
	}

	pub fn words(&self) -> &[u16] {
		&self.words
	}
}

impl WordStore for MemoryWordStore {
	fn erase(&mut self, size: EraseSize, offset: u16) -> crate::AResult<()> {
		if size == EraseSize::Bulk {
			debug!("bulk erase");
			self.words = [ERASED; WORD_COUNT];
			return Ok(());
		}
		let first = word_index(offset)?;
		let count = size.words();
		// multi-word erases work on aligned rows
		ensure!(first % count == 0, "{:?} erase needs an offset aligned to {} bytes, got {}", size, count * WORD_LEN as usize, offset);
		debug!("erase {} word(s) at offset {}", count, offset);
		for w in &mut self.words[first..first + count] {
			*w = ERASED;
		}
		Ok(())
	}

	fn read(&mut self, offset: u16) -> crate::AResult<u16> {
		Ok(self.words[word_index(offset)?])
	}

	fn write(&mut self, mode: WriteMode, offset: u16, word: u16) -> crate::AResult<()> {
		let index = word_index(offset)?;
		if mode == WriteMode::EraseFirst {
			self.words[index] = ERASED;
		} else if self.words[index] & word != word {
			warn!("programming 0x{:04x} over 0x{:04x} at offset {} without erase", word, self.words[index], offset);
		}
		self.words[index] &= word;
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::{
		ERASED,
		EraseSize,
		MemoryWordStore,
		OFFSET_LAST,
		WordStore,
		WriteMode,
	};

	#[test]
	fn first_and_last_word() {
		let mut store = MemoryWordStore::new();
		store.write(WriteMode::EraseFirst, 0, 0xdead).unwrap();
		store.write(WriteMode::EraseFirst, OFFSET_LAST, 0xdead).unwrap();
		assert_eq!(store.read(0).unwrap(), 0xdead);
		assert_eq!(store.read(OFFSET_LAST).unwrap(), 0xdead);
		assert_eq!(OFFSET_LAST, 510);
		assert!(store.read(511).is_err());
		assert!(store.read(512).is_err());
	}

	#[test]
	fn program_only_clears_bits() {
		let mut store = MemoryWordStore::new();
		store.write(WriteMode::ProgramOnly, 2, 0xa5a5).unwrap();
		assert_eq!(store.read(2).unwrap(), 0xa5a5);
		store.write(WriteMode::ProgramOnly, 2, 0x0ff0).unwrap();
		assert_eq!(store.read(2).unwrap(), 0x05a0);
		store.write(WriteMode::EraseFirst, 2, 0x0ff0).unwrap();
		assert_eq!(store.read(2).unwrap(), 0x0ff0);
	}

	#[test]
	fn erase_sizes() {
		let mut store = MemoryWordStore::new();
		store.write_seq(WriteMode::EraseFirst, 0, &[0u16; 64]).unwrap();

		// words 12-15
		store.erase(EraseSize::Four, 24).unwrap();
		let mut buf = [0u16; 64];
		store.read_seq(0, &mut buf).unwrap();
		for (i, &w) in buf.iter().enumerate() {
			assert_eq!(w, if i >= 12 && i < 16 { ERASED } else { 0 }, "word {}", i);
		}

		store.erase(EraseSize::One, 0).unwrap();
		assert_eq!(store.read(0).unwrap(), ERASED);
		assert!(store.erase(EraseSize::Eight, 8).is_err());
		store.erase(EraseSize::Eight, 16).unwrap();
		assert_eq!(store.read(16).unwrap(), ERASED);
		assert_eq!(store.read(32).unwrap(), 0);

		store.erase(EraseSize::Bulk, 0).unwrap();
		assert!(store.words().iter().all(|&w| w == ERASED));
	}

	#[test]
	fn sequences_stay_in_range() {
		let mut store = MemoryWordStore::new();
		store.write_seq(WriteMode::ProgramOnly, 0, &[0xa5a5; 256]).unwrap();
		let mut buf = [0u16; 256];
		store.read_seq(0, &mut buf).unwrap();
		assert!(buf.iter().all(|&w| w == 0xa5a5));
		assert!(store.read_seq(2, &mut buf).is_err());
		assert!(store.write_seq(WriteMode::ProgramOnly, 3, &[0]).is_err());
	}
}
