use std::mem;

/// Fixed-size value stored byte by byte (little-endian byte image)
pub trait Object: Sized {
	const SIZE: usize;

	/// `target.len() == SIZE`
	fn store(&self, target: &mut [u8]);
	/// `source.len() == SIZE`
	fn load(source: &[u8]) -> Self;
}

macro_rules! impl_object {
	($($t:ty),*) => {$(
		impl Object for $t {
			const SIZE: usize = mem::size_of::<$t>();

			fn store(&self, target: &mut [u8]) {
				target.copy_from_slice(&self.to_le_bytes());
			}

			fn load(source: &[u8]) -> Self {
				let mut buf = [0u8; mem::size_of::<$t>()];
				buf.copy_from_slice(source);
				<$t>::from_le_bytes(buf)
			}
		}
	)*};
}

impl_object!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

#[cfg(test)]
mod test {
	use super::Object;

	fn image<O: Object>(value: O) -> Vec<u8> {
		let mut buf = vec![0u8; O::SIZE];
		value.store(&mut buf);
		buf
	}

	#[test]
	fn byte_images() {
		assert_eq!(image(0x1234u16), vec![0x34, 0x12]);
		assert_eq!(image(-2i32), vec![0xfe, 0xff, 0xff, 0xff]);
		assert_eq!(image(3.14f32), 3.14f32.to_bits().to_le_bytes().to_vec());
		assert_eq!(<f64 as Object>::SIZE, 8);
		assert_eq!(u64::load(&image(1844674407370955161u64)), 1844674407370955161);
		assert_eq!(f64::load(&image(-0.5f64)).to_bits(), (-0.5f64).to_bits());
	}
}
