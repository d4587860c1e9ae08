use std::collections::HashSet;

use anyhow::bail;
use sluice_core::{Array, SourceData};

use crate::{
    error::{Kind, Result, StreamError},
    stream::DataStream,
    transformers::{Pipe, Transform},
    Data,
};

/// Applies a function to every item. With `add_sources` the function's
/// output is appended to the item as new sources instead of replacing it.
pub struct Mapping<F> {
    mapping: F,
    add_sources: bool,
    outputs: usize,
}

impl<F> Mapping<F>
where
    F: FnMut(Data) -> anyhow::Result<Data> + Send,
{
    pub fn new<S: DataStream>(
        stream: S,
        mapping: F,
        add_sources: Option<Vec<String>>,
    ) -> Result<Pipe<S, Mapping<F>>> {
        let mut sources = stream.sources().to_vec();
        let outputs = match &add_sources {
            Some(added) => {
                sources.extend(added.iter().cloned());
                added.len()
            }
            None => sources.len(),
        };
        let mut seen = HashSet::new();
        if let Some(duplicate) = sources.iter().find(|s| !seen.insert(s.as_str())) {
            return Err(StreamError::config(format!(
                "source '{duplicate}' would exist twice after the mapping"
            )));
        }
        let mapping = Mapping {
            mapping,
            add_sources: add_sources.is_some(),
            outputs,
        };
        Ok(Pipe::new(stream, mapping).with_sources(sources))
    }
}

impl<F> Transform for Mapping<F>
where
    F: FnMut(Data) -> anyhow::Result<Data> + Send,
{
    fn transform_any(&mut self, data: Data, _kind: Kind) -> Result<Data> {
        let original = self.add_sources.then(|| data.clone());
        let image = (self.mapping)(data)?;
        if image.len() != self.outputs {
            return Err(StreamError::invalid_request(format!(
                "mapping returned {} sources, expected {}",
                image.len(),
                self.outputs
            )));
        }
        Ok(match original {
            Some(mut original) => {
                original.extend(image);
                original
            }
            None => image,
        })
    }
}

/// A mapping that reorders the examples of every batch by `key`, which is
/// given one example (one array per source).
pub fn sort_mapping<K, F>(key: F, reverse: bool) -> impl FnMut(Data) -> anyhow::Result<Data> + Send
where
    K: Ord,
    F: Fn(&[Array]) -> K + Send,
{
    move |batch: Data| -> anyhow::Result<Data> {
        let columns = batch
            .into_iter()
            .map(SourceData::into_examples)
            .collect::<Result<Vec<_>, _>>()?;
        let len = columns.first().map_or(0, Vec::len);
        if columns.iter().any(|c| c.len() != len) {
            bail!("all sources of a batch must hold the same number of examples");
        }
        let keys: Vec<K> = (0..len)
            .map(|i| {
                let example: Vec<Array> = columns.iter().map(|c| c[i].clone()).collect();
                key(&example)
            })
            .collect();
        let mut order: Vec<usize> = (0..len).collect();
        order.sort_by(|&a, &b| {
            let ordering = keys[a].cmp(&keys[b]);
            if reverse {
                ordering.reverse()
            } else {
                ordering
            }
        });
        Ok(columns
            .iter()
            .map(|column| {
                SourceData::from_examples(order.iter().map(|&i| column[i].clone()).collect())
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_mapping_orders_examples_by_key() {
        let mut sort = sort_mapping(
            |example: &[Array]| example[0].to_vec::<i64>().map(|v| v[0]).unwrap_or(0),
            false,
        );
        let batch = vec![
            SourceData::Array(Array::from_vec(vec![3i64, 1, 2])),
            SourceData::List(vec![
                Array::from_vec(vec![3u8, 3, 3]),
                Array::from_vec(vec![1u8]),
                Array::from_vec(vec![2u8, 2]),
            ]),
        ];
        let sorted = sort(batch).unwrap();
        assert_eq!(
            sorted[0].as_array().unwrap().to_vec::<i64>().unwrap(),
            vec![1, 2, 3]
        );
        assert_eq!(sorted[1].example(0).unwrap(), Array::from_vec(vec![1u8]));
        assert_eq!(sorted[1].example(2).unwrap().len(), 3);

        let mut reversed = sort_mapping(
            |example: &[Array]| example[0].to_vec::<i64>().map(|v| v[0]).unwrap_or(0),
            true,
        );
        let batch = vec![SourceData::Array(Array::from_vec(vec![3i64, 1, 2]))];
        assert_eq!(
            reversed(batch).unwrap()[0].as_array().unwrap().to_vec::<i64>().unwrap(),
            vec![3, 2, 1]
        );
    }
}
