#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

macro_rules! with_context {
	(( $fmt:tt $($t:tt)* ), $e:expr) => {{
		use failure::Error;

		match (|| { $e })() {
			Ok(v) => Ok(v),
			Err(e) => {
				let e: Error = e;
				let msg = format!(concat!($fmt, ": {}") $($t)*, e);
				Err(Error::from(e.context(msg)))
			}
		}
	}};

	($msg:expr, $e:expr) => {
		with_context!(("{}", $msg), $e)
	};
}

pub type AResult<T> = Result<T, failure::Error>;

pub mod config;
pub mod error;
pub mod gpio;
pub mod i2c;
pub mod nvm;
pub mod sim;

pub use self::config::{
	BoundsPolicy,
	BusSpeed,
	Config,
};
pub use self::error::EepromError;
pub use self::i2c::{
	BusTransport,
	Eeprom,
};

/// parse a number with optional `0x` (hex) or `0b` (binary) prefix
pub fn parse_number<T>(s: &str) -> AResult<T>
where
	T: FromStrRadix,
{
	with_context!(("invalid number {:?}", s), {
		let (digits, radix) = if s.starts_with("0x") || s.starts_with("0X") {
			(&s[2..], 16)
		} else if s.starts_with("0b") || s.starts_with("0B") {
			(&s[2..], 2)
		} else {
			(s, 10)
		};
		ensure!(!digits.is_empty(), "no digits");
		T::from_str_radix(digits, radix)
	})
}

pub trait FromStrRadix: Sized {
	fn from_str_radix(s: &str, radix: u32) -> AResult<Self>;
}

macro_rules! impl_from_str_radix {
	($($t:ty),*) => {$(
		impl FromStrRadix for $t {
			fn from_str_radix(s: &str, radix: u32) -> AResult<Self> {
				Ok(<$t>::from_str_radix(s, radix)?)
			}
		}
	)*};
}

impl_from_str_radix!(u8, u16, u32, usize);
