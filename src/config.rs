use std::fmt;
use std::str;
use std::time::Duration;

use crate::i2c::{
	MAX_ADDRESS,
	Stalled,
	reliable_sleep,
};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum BusSpeed {
	/// 100 kHz
	Standard,
	/// 400 kHz
	Fast,
}

impl BusSpeed {
	pub fn frequency(self) -> u32 {
		match self {
			BusSpeed::Standard => 100_000,
			BusSpeed::Fast => 400_000,
		}
	}

	/// half a clock period; the bit-bang transport waits this long per edge
	pub fn clock_edge(self) -> Duration {
		Duration::from_nanos(500_000_000 / u64::from(self.frequency()))
	}

	/// reload value for a baud rate generator clocked at `fcy` Hz
	///
	/// `fcy / fscl - fcy / 10 MHz - 1` (includes the 100ns pulse gobbler
	/// delay), i.e. 157 and 37 at 16 MHz.
	pub fn baud_rate_generator(self, fcy: u32) -> u32 {
		let fcy = u64::from(fcy);
		let fscl = u64::from(self.frequency());
		// scaled by 10 to keep the first decimal before truncating
		let scaled = (fcy * 10 / fscl).saturating_sub(fcy / 1_000_000 + 10);
		(scaled / 10) as u32
	}
}

impl Default for BusSpeed {
	fn default() -> Self {
		BusSpeed::Standard
	}
}

impl fmt::Display for BusSpeed {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}kHz", self.frequency() / 1000)
	}
}

impl str::FromStr for BusSpeed {
	type Err = ::failure::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim_end_matches("kHz") {
			"100" => Ok(BusSpeed::Standard),
			"400" => Ok(BusSpeed::Fast),
			_ => bail!("unsupported bus speed {:?} (expected 100 or 400)", s),
		}
	}
}

/// How multi-byte spans are checked against the device capacity.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum BoundsPolicy {
	/// only reject `address > MAX_ADDRESS + len`; accepts spans running past
	/// the end of memory (e.g. 8 bytes at 0x7d), which the device wraps.
	Legacy,
	/// reject unless the last touched address `address + len - 1` is valid
	Strict,
}

impl BoundsPolicy {
	/// whether `len` bytes starting at `address` pass the check
	pub fn allows(self, address: u8, len: usize) -> bool {
		let address = usize::from(address);
		let max = usize::from(MAX_ADDRESS);
		match self {
			// start addresses up to 0x7f + len pass; the device ignores the
			// address MSB
			BoundsPolicy::Legacy => address <= max + len,
			BoundsPolicy::Strict => address <= max && (len == 0 || address + len - 1 <= max),
		}
	}
}

impl Default for BoundsPolicy {
	fn default() -> Self {
		BoundsPolicy::Legacy
	}
}

/// Retry budget for a blocking wait.
///
/// Replaces spinning on a status condition forever: the condition is
/// checked up to `attempts` times, sleeping `interval` in between.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct WaitBudget {
	pub attempts: u32,
	pub interval: Duration,
}

impl WaitBudget {
	pub fn new(attempts: u32, interval: Duration) -> Self {
		WaitBudget { attempts, interval }
	}

	/// check `condition` until it holds or the budget is exhausted; errors
	/// from `condition` abort the wait
	pub fn wait_until<F>(&self, what: &'static str, mut condition: F) -> Result<(), Stalled>
	where
		F: FnMut() -> Result<bool, Stalled>,
	{
		for attempt in 0..self.attempts {
			if condition()? {
				return Ok(());
			}
			if attempt + 1 < self.attempts && self.interval > Duration::from_nanos(0) {
				reliable_sleep(self.interval);
			}
		}
		Err(Stalled { what })
	}
}

impl Default for WaitBudget {
	fn default() -> Self {
		// ~10ms at 10us per check; covers clock stretching of slow devices
		WaitBudget::new(1000, Duration::from_micros(10))
	}
}

/// Driver configuration.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Config {
	pub speed: BusSpeed,
	pub bounds: BoundsPolicy,
	/// maximum number of acknowledge polling probes after a write; the
	/// write cycle takes up to 5ms, a probe at 100kHz about 0.1ms.
	pub poll_limit: u32,
	/// budget for the transport's wait on the bus
	pub wait: WaitBudget,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			speed: BusSpeed::default(),
			bounds: BoundsPolicy::default(),
			poll_limit: 200,
			wait: WaitBudget::default(),
		}
	}
}
