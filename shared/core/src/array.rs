use std::ops::Range;

use ndarray::{ArrayD, Axis, IxDyn, Slice};
use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};

use crate::{
    element::{decode_le, Element},
    ArrayError, DType,
};

/// A dynamically shaped n-dimensional array whose element type is only known
/// at runtime. The first axis is the example (or batch) axis wherever one is
/// expected.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Array {
    U8(ArrayD<u8>),
    I32(ArrayD<i32>),
    I64(ArrayD<i64>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
}

/// Applies `$body` to the inner `ArrayD<T>` and rewraps the result in the
/// same variant.
macro_rules! map_array {
    ($array:expr, $inner:ident => $body:expr) => {
        match $array {
            Array::U8($inner) => Array::U8($body),
            Array::I32($inner) => Array::I32($body),
            Array::I64($inner) => Array::I64($body),
            Array::F32($inner) => Array::F32($body),
            Array::F64($inner) => Array::F64($body),
        }
    };
}

macro_rules! with_array {
    ($array:expr, $inner:ident => $body:expr) => {
        match $array {
            Array::U8($inner) => $body,
            Array::I32($inner) => $body,
            Array::I64($inner) => $body,
            Array::F32($inner) => $body,
            Array::F64($inner) => $body,
        }
    };
}

macro_rules! cast_into {
    ($inner:expr, $dtype:expr) => {
        match $dtype {
            DType::U8 => Array::U8($inner.mapv(|x| AsPrimitive::<u8>::as_(x))),
            DType::I32 => Array::I32($inner.mapv(|x| AsPrimitive::<i32>::as_(x))),
            DType::I64 => Array::I64($inner.mapv(|x| AsPrimitive::<i64>::as_(x))),
            DType::F32 => Array::F32($inner.mapv(|x| AsPrimitive::<f32>::as_(x))),
            DType::F64 => Array::F64($inner.mapv(|x| AsPrimitive::<f64>::as_(x))),
        }
    };
}

impl Array {
    pub fn from_shape_vec<T: Element>(shape: &[usize], data: Vec<T>) -> Result<Self, ArrayError> {
        Ok(T::into_array(ArrayD::from_shape_vec(IxDyn(shape), data)?))
    }

    pub fn from_vec<T: Element>(data: Vec<T>) -> Self {
        T::into_array(ndarray::Array1::from_vec(data).into_dyn())
    }

    pub fn scalar<T: Element>(value: T) -> Self {
        T::into_array(ArrayD::from_elem(IxDyn(&[]), value))
    }

    pub fn zeros(dtype: DType, shape: &[usize]) -> Self {
        match dtype {
            DType::U8 => Array::U8(ArrayD::zeros(IxDyn(shape))),
            DType::I32 => Array::I32(ArrayD::zeros(IxDyn(shape))),
            DType::I64 => Array::I64(ArrayD::zeros(IxDyn(shape))),
            DType::F32 => Array::F32(ArrayD::zeros(IxDyn(shape))),
            DType::F64 => Array::F64(ArrayD::zeros(IxDyn(shape))),
        }
    }

    pub fn from_le_bytes(dtype: DType, shape: &[usize], bytes: &[u8]) -> Result<Self, ArrayError> {
        match dtype {
            DType::U8 => Self::from_shape_vec(shape, decode_le::<u8>(bytes)?),
            DType::I32 => Self::from_shape_vec(shape, decode_le::<i32>(bytes)?),
            DType::I64 => Self::from_shape_vec(shape, decode_le::<i64>(bytes)?),
            DType::F32 => Self::from_shape_vec(shape, decode_le::<f32>(bytes)?),
            DType::F64 => Self::from_shape_vec(shape, decode_le::<f64>(bytes)?),
        }
    }

    /// Row-major little-endian encoding of every element.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        with_array!(self, a => {
            let mut out = Vec::with_capacity(a.len() * self.dtype().size_in_bytes());
            for v in a.iter() {
                v.write_le(&mut out);
            }
            out
        })
    }

    pub fn dtype(&self) -> DType {
        match self {
            Array::U8(_) => DType::U8,
            Array::I32(_) => DType::I32,
            Array::I64(_) => DType::I64,
            Array::F32(_) => DType::F32,
            Array::F64(_) => DType::F64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        with_array!(self, a => a.shape())
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Total number of elements.
    pub fn size(&self) -> usize {
        with_array!(self, a => a.len())
    }

    /// Length of the first axis, zero for scalars.
    pub fn len(&self) -> usize {
        self.shape().first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_array<T: Element>(&self) -> Option<&ArrayD<T>> {
        T::array_ref(self)
    }

    /// Every element in logical (row-major) order.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>, ArrayError> {
        self.as_array::<T>()
            .map(|a| a.iter().copied().collect())
            .ok_or(ArrayError::DTypeMismatch {
                expected: T::DTYPE,
                found: self.dtype(),
            })
    }

    fn check_rows(&self) -> Result<usize, ArrayError> {
        if self.ndim() == 0 {
            return Err(ArrayError::Scalar);
        }
        Ok(self.len())
    }

    pub fn row(&self, index: usize) -> Result<Array, ArrayError> {
        let len = self.check_rows()?;
        if index >= len {
            return Err(ArrayError::OutOfBounds { index, len });
        }
        Ok(map_array!(self, a => a.index_axis(Axis(0), index).to_owned()))
    }

    /// Gathers rows in the order given; repeated indices are allowed.
    pub fn select_rows(&self, indices: &[usize]) -> Result<Array, ArrayError> {
        let len = self.check_rows()?;
        if let Some(&index) = indices.iter().find(|&&i| i >= len) {
            return Err(ArrayError::OutOfBounds { index, len });
        }
        Ok(map_array!(self, a => a.select(Axis(0), indices)))
    }

    pub fn slice_rows(&self, rows: Range<usize>) -> Result<Array, ArrayError> {
        let len = self.check_rows()?;
        if rows.start > rows.end || rows.end > len {
            return Err(ArrayError::RangeOutOfBounds {
                start: rows.start,
                stop: rows.end,
                len,
            });
        }
        Ok(map_array!(self, a => a.slice_axis(Axis(0), Slice::from(rows.clone())).to_owned()))
    }

    /// Stacks arrays of identical dtype and shape along a new leading axis.
    pub fn stack(rows: &[Array]) -> Result<Array, ArrayError> {
        let first = rows.first().ok_or(ArrayError::EmptyStack)?;
        macro_rules! stack_as {
            ($variant:ident) => {{
                let views = rows
                    .iter()
                    .map(|row| match row {
                        Array::$variant(a) => Ok(a.view()),
                        other => Err(ArrayError::DTypeMismatch {
                            expected: first.dtype(),
                            found: other.dtype(),
                        }),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Array::$variant(ndarray::stack(Axis(0), &views)?)
            }};
        }
        Ok(match first {
            Array::U8(_) => stack_as!(U8),
            Array::I32(_) => stack_as!(I32),
            Array::I64(_) => stack_as!(I64),
            Array::F32(_) => stack_as!(F32),
            Array::F64(_) => stack_as!(F64),
        })
    }

    /// Joins arrays of identical dtype and trailing shape along the first
    /// axis.
    pub fn concatenate(parts: &[Array]) -> Result<Array, ArrayError> {
        let first = parts.first().ok_or(ArrayError::EmptyStack)?;
        if let [only] = parts {
            return Ok(only.clone());
        }
        macro_rules! concat_as {
            ($variant:ident) => {{
                let views = parts
                    .iter()
                    .map(|part| match part {
                        Array::$variant(a) if a.ndim() > 0 => Ok(a.view()),
                        Array::$variant(_) => Err(ArrayError::Scalar),
                        other => Err(ArrayError::DTypeMismatch {
                            expected: first.dtype(),
                            found: other.dtype(),
                        }),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Array::$variant(ndarray::concatenate(Axis(0), &views)?)
            }};
        }
        Ok(match first {
            Array::U8(_) => concat_as!(U8),
            Array::I32(_) => concat_as!(I32),
            Array::I64(_) => concat_as!(I64),
            Array::F32(_) => concat_as!(F32),
            Array::F64(_) => concat_as!(F64),
        })
    }

    pub fn reshape(&self, shape: &[usize]) -> Result<Array, ArrayError> {
        if shape.iter().product::<usize>() != self.size() {
            return Err(ArrayError::Reshape {
                from: self.shape().to_vec(),
                to: shape.to_vec(),
            });
        }
        Ok(map_array!(self, a => a.to_shape(IxDyn(shape))?.into_owned()))
    }

    pub fn flatten(&self) -> Result<Array, ArrayError> {
        self.reshape(&[self.size()])
    }

    /// Collapses every axis but the first, `(n, ...) -> (n, prod(...))`.
    pub fn flatten_rows(&self) -> Result<Array, ArrayError> {
        let rows = self.check_rows()?;
        let rest = self.shape()[1..].iter().product();
        self.reshape(&[rows, rest])
    }

    pub fn cast(&self, dtype: DType) -> Array {
        if self.dtype() == dtype {
            return self.clone();
        }
        with_array!(self, a => cast_into!(a, dtype))
    }

    /// `self * scale + shift`. Integer arrays are promoted to float64 first,
    /// float arrays keep their precision.
    pub fn scale_and_shift(&self, scale: f64, shift: f64) -> Array {
        match self {
            Array::F32(a) => {
                let (scale, shift) = (scale as f32, shift as f32);
                Array::F32(a.mapv(|x| x * scale + shift))
            }
            Array::F64(a) => Array::F64(a.mapv(|x| x * scale + shift)),
            other => other.cast(DType::F64).scale_and_shift(scale, shift),
        }
    }

    /// Copies `source` into the leading rows of row `index` of `self`,
    /// i.e. `self[index, :len(source)] = source`.
    pub fn assign_prefix(&mut self, index: usize, source: &Array) -> Result<(), ArrayError> {
        let len = self.check_rows()?;
        if index >= len {
            return Err(ArrayError::OutOfBounds { index, len });
        }
        let expected = self.dtype();
        macro_rules! assign_as {
            ($dest:expr, $variant:ident) => {{
                let Array::$variant(src) = source else {
                    return Err(ArrayError::DTypeMismatch {
                        expected,
                        found: source.dtype(),
                    });
                };
                let mut row = $dest.index_axis_mut(Axis(0), index);
                if row.ndim() != src.ndim()
                    || row.ndim() == 0
                    || src.shape()[0] > row.shape()[0]
                    || row.shape()[1..] != src.shape()[1..]
                {
                    return Err(ArrayError::Reshape {
                        from: src.shape().to_vec(),
                        to: row.shape().to_vec(),
                    });
                }
                row.slice_axis_mut(Axis(0), Slice::from(0..src.shape()[0]))
                    .assign(src);
            }};
        }
        match self {
            Array::U8(a) => assign_as!(a, U8),
            Array::I32(a) => assign_as!(a, I32),
            Array::I64(a) => assign_as!(a, I64),
            Array::F32(a) => assign_as!(a, F32),
            Array::F64(a) => assign_as!(a, F64),
        }
        Ok(())
    }
}

impl<T: Element> From<ArrayD<T>> for Array {
    fn from(value: ArrayD<T>) -> Self {
        T::into_array(value)
    }
}

impl<T: Element> From<Vec<T>> for Array {
    fn from(value: Vec<T>) -> Self {
        Array::from_vec(value)
    }
}
