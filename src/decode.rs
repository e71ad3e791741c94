/// A primitive that can be decoded from the little-endian bytes a read
/// produced.
///
/// Replaces the classic "reinterpret the buffer as `T`" shortcut with an
/// explicit, width-checked decode: [`crate::MemoryAccessor::decode`] refuses
/// to decode past the bytes the most recent read actually filled.
pub trait Decode: Sized {
    /// Builds the value from exactly `size_of::<Self>()` little-endian bytes.
    fn decode(bytes: &[u8]) -> Self;
}

macro_rules! impl_decode {
    ($($t:ty),+ $(,)?) => {
        $(
            impl Decode for $t {
                fn decode(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; size_of::<$t>()];
                    raw.copy_from_slice(bytes);
                    <$t>::from_le_bytes(raw)
                }
            }
        )+
    };
}

impl_decode!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, f32, f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_little_endian() {
        assert_eq!(u32::decode(&[0x78, 0x56, 0x34, 0x12]), 0x1234_5678);
        assert_eq!(i32::decode(&[0xff, 0xff, 0xff, 0xff]), -1);
        assert_eq!(u8::decode(&[0x2a]), 42);
    }
}
