use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::{Array, ArrayError};

/// The value of one source inside an example or a batch.
///
/// Batches whose examples all share a dtype and shape are stored densely;
/// anything else (variable-length sequences before padding, mostly) stays a
/// list of per-example arrays.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SourceData {
    Array(Array),
    List(Vec<Array>),
}

impl SourceData {
    pub fn from_examples(examples: Vec<Array>) -> Self {
        let uniform = examples
            .split_first()
            .map(|(first, rest)| {
                rest.iter()
                    .all(|e| e.dtype() == first.dtype() && e.shape() == first.shape())
            })
            .unwrap_or(false);
        if uniform {
            if let Ok(stacked) = Array::stack(&examples) {
                return SourceData::Array(stacked);
            }
        }
        SourceData::List(examples)
    }

    /// Number of examples along the leading axis.
    pub fn len(&self) -> usize {
        match self {
            SourceData::Array(a) => a.len(),
            SourceData::List(l) => l.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            SourceData::Array(a) => Some(a),
            SourceData::List(_) => None,
        }
    }

    pub fn into_array(self) -> Option<Array> {
        match self {
            SourceData::Array(a) => Some(a),
            SourceData::List(_) => None,
        }
    }

    pub fn example(&self, index: usize) -> Result<Array, ArrayError> {
        match self {
            SourceData::Array(a) => a.row(index),
            SourceData::List(l) => l.get(index).cloned().ok_or(ArrayError::OutOfBounds {
                index,
                len: l.len(),
            }),
        }
    }

    pub fn into_examples(self) -> Result<Vec<Array>, ArrayError> {
        match self {
            SourceData::Array(a) => (0..a.len()).map(|i| a.row(i)).collect(),
            SourceData::List(l) => Ok(l),
        }
    }

    pub fn select(&self, indices: &[usize]) -> Result<SourceData, ArrayError> {
        match self {
            SourceData::Array(a) => Ok(SourceData::Array(a.select_rows(indices)?)),
            SourceData::List(_) => Ok(SourceData::List(
                indices
                    .iter()
                    .map(|&i| self.example(i))
                    .collect::<Result<_, _>>()?,
            )),
        }
    }

    pub fn slice(&self, rows: Range<usize>) -> Result<SourceData, ArrayError> {
        match self {
            SourceData::Array(a) => Ok(SourceData::Array(a.slice_rows(rows)?)),
            SourceData::List(l) => l
                .get(rows.clone())
                .map(|s| SourceData::List(s.to_vec()))
                .ok_or(ArrayError::RangeOutOfBounds {
                    start: rows.start,
                    stop: rows.end,
                    len: l.len(),
                }),
        }
    }

    /// Applies `f` to the dense array, or to every element of a list.
    pub fn map_arrays<E>(
        self,
        mut f: impl FnMut(Array) -> Result<Array, E>,
    ) -> Result<SourceData, E> {
        match self {
            SourceData::Array(a) => Ok(SourceData::Array(f(a)?)),
            SourceData::List(l) => Ok(SourceData::List(
                l.into_iter().map(f).collect::<Result<_, _>>()?,
            )),
        }
    }
}

impl From<Array> for SourceData {
    fn from(value: Array) -> Self {
        SourceData::Array(value)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn uniform_examples_stack_densely() {
        let data = SourceData::from_examples(vec![
            Array::from_vec(vec![1i32, 2]),
            Array::from_vec(vec![3i32, 4]),
        ]);
        let dense = data.as_array().unwrap();
        assert_eq!(dense.shape(), &[2, 2]);
    }

    #[test]
    fn ragged_examples_stay_a_list() {
        let data = SourceData::from_examples(vec![
            Array::from_vec(vec![1i32, 2, 3]),
            Array::from_vec(vec![4i32]),
        ]);
        assert!(matches!(data, SourceData::List(ref l) if l.len() == 2));
        assert_eq!(data.example(1).unwrap().to_vec::<i32>().unwrap(), vec![4]);
    }

    #[test]
    fn into_examples_round_trips() {
        let examples = vec![Array::scalar(1.0f64), Array::scalar(2.0f64)];
        let data = SourceData::from_examples(examples.clone());
        assert_eq!(data.len(), 2);
        assert_eq!(data.into_examples().unwrap(), examples);
        assert!(SourceData::from_examples(vec![]).is_empty());
    }

    #[test]
    fn select_and_slice_lists() {
        let data = SourceData::List(vec![
            Array::from_vec(vec![1u8]),
            Array::from_vec(vec![2u8, 2]),
            Array::from_vec(vec![3u8, 3, 3]),
        ]);
        let picked = data.select(&[2, 0]).unwrap();
        assert_eq!(picked.example(0).unwrap().len(), 3);
        assert_eq!(data.slice(1..3).unwrap().len(), 2);
        assert!(data.slice(2..4).is_err());
    }
}
