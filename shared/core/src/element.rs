use ndarray::ArrayD;
use num_traits::Zero;

use crate::{Array, ArrayError, DType};

/// A primitive that can live inside an [`Array`] and round-trip through
/// little-endian bytes.
pub trait Element: Copy + Zero + PartialEq + Send + Sync + std::fmt::Debug + 'static {
    const DTYPE: DType;
    const SIZE: usize;

    /// `bytes` is exactly `SIZE` long.
    fn read_le(bytes: &[u8]) -> Self;
    fn write_le(self, out: &mut Vec<u8>);

    fn into_array(array: ArrayD<Self>) -> Array;
    fn array_ref(array: &Array) -> Option<&ArrayD<Self>>;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            const DTYPE: DType = DType::$variant;
            const SIZE: usize = std::mem::size_of::<$ty>();

            fn read_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                buf.copy_from_slice(bytes);
                <$ty>::from_le_bytes(buf)
            }

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn into_array(array: ArrayD<Self>) -> Array {
                Array::$variant(array)
            }

            fn array_ref(array: &Array) -> Option<&ArrayD<Self>> {
                match array {
                    Array::$variant(a) => Some(a),
                    _ => None,
                }
            }
        }
    };
}

impl_element!(u8, U8);
impl_element!(i32, I32);
impl_element!(i64, I64);
impl_element!(f32, F32);
impl_element!(f64, F64);

pub(crate) fn decode_le<T: Element>(bytes: &[u8]) -> Result<Vec<T>, ArrayError> {
    if bytes.len() % T::SIZE != 0 {
        return Err(ArrayError::ByteLength {
            len: bytes.len(),
            dtype: T::DTYPE,
        });
    }
    Ok(bytes.chunks_exact(T::SIZE).map(T::read_le).collect())
}
