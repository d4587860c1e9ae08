use crate::DType;

#[derive(Debug, thiserror::Error)]
pub enum ArrayError {
    #[error("dtype mismatch: expected {expected}, found {found}")]
    DTypeMismatch { expected: DType, found: DType },

    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("cannot reshape array of shape {from:?} into {to:?}")]
    Reshape { from: Vec<usize>, to: Vec<usize> },

    #[error("index {index} is out of bounds for an axis of length {len}")]
    OutOfBounds { index: usize, len: usize },

    #[error("rows {start}..{stop} are out of bounds for an axis of length {len}")]
    RangeOutOfBounds { start: usize, stop: usize, len: usize },

    #[error("operation needs at least one axis but the array is a scalar")]
    Scalar,

    #[error("cannot stack an empty list of arrays")]
    EmptyStack,

    #[error("{len} bytes is not a whole number of {dtype} elements")]
    ByteLength { len: usize, dtype: DType },

    #[error("unknown dtype {0:?}")]
    UnknownDType(String),
}
