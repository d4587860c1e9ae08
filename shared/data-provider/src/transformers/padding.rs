use sluice_core::{Array, DType, SourceData};

use crate::{
    error::{Result, StreamError},
    stream::DataStream,
    transformers::{check_known_sources, Pipe, Transform},
    Data,
};

/// Pads the variable-length sources of a batch stream to the longest
/// example in each batch and adds a `<source>_mask` source right after each
/// padded one, 1 where the data is real and 0 where it is padding.
pub struct Padding {
    stream_sources: Vec<String>,
    mask_sources: Vec<String>,
    mask_dtype: DType,
}

impl Padding {
    /// `mask_sources` defaults to every source.
    pub fn new<S: DataStream>(
        stream: S,
        mask_sources: Option<Vec<String>>,
        mask_dtype: DType,
    ) -> Result<Pipe<S, Padding>> {
        if stream.produces_examples() {
            return Err(StreamError::config(
                "padding works on batch streams, batch the examples first",
            ));
        }
        let stream_sources = stream.sources().to_vec();
        let mask_sources = mask_sources.unwrap_or_else(|| stream_sources.clone());
        check_known_sources(&mask_sources, &stream_sources)?;

        let mut sources = Vec::with_capacity(stream_sources.len() + mask_sources.len());
        for source in &stream_sources {
            sources.push(source.clone());
            if mask_sources.contains(source) {
                sources.push(format!("{source}_mask"));
            }
        }

        let axis_labels = stream.axis_labels().map(|labels| {
            let mut labels = labels.clone();
            for source in &mask_sources {
                if let Some(source_labels) = labels.get(source).filter(|l| l.len() >= 2) {
                    let mask_labels = source_labels[..2].to_vec();
                    labels.insert(format!("{source}_mask"), mask_labels);
                }
            }
            labels
        });

        let padding = Padding {
            stream_sources,
            mask_sources,
            mask_dtype,
        };
        Ok(Pipe::new(stream, padding)
            .with_sources(sources)
            .with_axis_labels(axis_labels))
    }

    fn pad(&self, source: &str, batch: SourceData) -> Result<(SourceData, SourceData)> {
        let examples = batch.into_examples()?;
        let Some(first) = examples.first() else {
            return Err(StreamError::invalid_request(format!(
                "cannot pad source '{source}' of an empty batch"
            )));
        };
        if examples.iter().any(|e| e.ndim() == 0) {
            return Err(StreamError::invalid_request(format!(
                "source '{source}' holds scalars, padding needs sequences"
            )));
        }
        let dtype = first.dtype();
        let rest = &first.shape()[1..];
        if examples
            .iter()
            .any(|e| e.dtype() != dtype || &e.shape()[1..] != rest)
        {
            return Err(StreamError::invalid_request(format!(
                "all dimensions except length must be equal for source '{source}'"
            )));
        }

        let lengths: Vec<usize> = examples.iter().map(Array::len).collect();
        let max_len = lengths.iter().copied().max().unwrap_or(0);
        let mut shape = Vec::with_capacity(rest.len() + 2);
        shape.push(examples.len());
        shape.push(max_len);
        shape.extend_from_slice(rest);

        let mut padded = Array::zeros(dtype, &shape);
        for (i, example) in examples.iter().enumerate() {
            padded.assign_prefix(i, example)?;
        }

        let mask: Vec<f64> = lengths
            .iter()
            .flat_map(|&len| (0..max_len).map(move |j| if j < len { 1.0 } else { 0.0 }))
            .collect();
        let mask = Array::from_shape_vec(&[examples.len(), max_len], mask)?.cast(self.mask_dtype);

        Ok((SourceData::Array(padded), SourceData::Array(mask)))
    }
}

impl Transform for Padding {
    fn transform_batch(&mut self, batch: Data) -> Result<Data> {
        let mut out = Vec::with_capacity(batch.len() + self.mask_sources.len());
        for (data, source) in batch.into_iter().zip(&self.stream_sources) {
            if self.mask_sources.contains(source) {
                let (padded, mask) = self.pad(source, data)?;
                out.push(padded);
                out.push(mask);
            } else {
                out.push(data);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        schemes::{SequentialExampleScheme, SequentialScheme},
        storage::IndexableDataset,
        stream::DatasetStream,
    };

    fn sequences(rows: Vec<Vec<i64>>) -> Pipe<DatasetStream<IndexableDataset>, Padding> {
        let n = rows.len();
        let dataset = IndexableDataset::new([(
            "features",
            SourceData::List(rows.into_iter().map(Array::from_vec).collect()),
        )])
        .unwrap();
        let stream = DatasetStream::new(dataset, SequentialScheme::new(n, n).unwrap()).unwrap();
        Padding::new(stream, None, DType::F32).unwrap()
    }

    #[test]
    fn pads_and_masks() {
        let mut stream = sequences(vec![vec![1, 2, 3], vec![4], vec![5, 6, 7, 8]]);
        assert_eq!(stream.sources(), &["features", "features_mask"]);
        let batch = stream.get_epoch_iterator().unwrap().next().unwrap().unwrap();
        let padded = batch[0].as_array().unwrap();
        assert_eq!(padded.shape(), &[3, 4]);
        assert_eq!(
            padded.to_vec::<i64>().unwrap(),
            vec![1, 2, 3, 0, 4, 0, 0, 0, 5, 6, 7, 8]
        );
        let mask = batch[1].as_array().unwrap();
        assert_eq!(mask.dtype(), DType::F32);
        assert_eq!(
            mask.to_vec::<f32>().unwrap(),
            vec![1.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0]
        );
    }

    #[test]
    fn example_streams_are_rejected() {
        let dataset = IndexableDataset::new([(
            "features",
            SourceData::Array(Array::from_vec(vec![1i64, 2])),
        )])
        .unwrap();
        let stream = DatasetStream::new(dataset, SequentialExampleScheme::new(2)).unwrap();
        assert!(Padding::new(stream, None, DType::F32).err().unwrap().is_config());
    }
}
