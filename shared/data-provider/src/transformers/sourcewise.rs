use sluice_core::{Array, DType, SourceData};

use crate::{
    error::{Kind, Result, StreamError},
    stream::DataStream,
    transformers::{check_known_sources, short_type_name, Pipe, Transform},
    Data,
};

/// A rewrite of a single source, applied to the selected sources of every
/// item by [`Sourcewise`].
pub trait SourceTransform: Send {
    fn transform_any_source(
        &mut self,
        data: SourceData,
        source: &str,
        kind: Kind,
    ) -> Result<SourceData> {
        let _ = (data, source);
        Err(StreamError::Unsupported {
            transformer: short_type_name::<Self>(),
            kind,
        })
    }

    fn transform_source_example(
        &mut self,
        example: SourceData,
        source: &str,
    ) -> Result<SourceData> {
        self.transform_any_source(example, source, Kind::Example)
    }

    fn transform_source_batch(&mut self, batch: SourceData, source: &str) -> Result<SourceData> {
        self.transform_any_source(batch, source, Kind::Batch)
    }
}

/// Runs a [`SourceTransform`] over `which_sources`, passing every other
/// source through untouched.
pub struct Sourcewise<T> {
    op: T,
    stream_sources: Vec<String>,
    which_sources: Vec<String>,
}

impl<T: SourceTransform> Sourcewise<T> {
    /// `which_sources` defaults to all of `stream_sources`.
    pub fn new(
        op: T,
        stream_sources: &[String],
        which_sources: Option<Vec<String>>,
    ) -> Result<Self> {
        let which_sources = which_sources.unwrap_or_else(|| stream_sources.to_vec());
        check_known_sources(&which_sources, stream_sources)?;
        Ok(Self {
            op,
            stream_sources: stream_sources.to_vec(),
            which_sources,
        })
    }

    pub fn which_sources(&self) -> &[String] {
        &self.which_sources
    }

    pub fn op(&self) -> &T {
        &self.op
    }

    fn apply(&mut self, data: Data, kind: Kind) -> Result<Data> {
        let Self {
            op,
            stream_sources,
            which_sources,
        } = self;
        data.into_iter()
            .zip(stream_sources.iter())
            .map(|(value, name)| {
                if !which_sources.contains(name) {
                    return Ok(value);
                }
                match kind {
                    Kind::Example => op.transform_source_example(value, name),
                    Kind::Batch => op.transform_source_batch(value, name),
                }
            })
            .collect()
    }
}

impl<T: SourceTransform> Transform for Sourcewise<T> {
    fn transform_example(&mut self, example: Data) -> Result<Data> {
        self.apply(example, Kind::Example)
    }

    fn transform_batch(&mut self, batch: Data) -> Result<Data> {
        self.apply(batch, Kind::Batch)
    }
}

/// Wraps `stream` in a sourcewise pipe, keeping its labels.
fn sourcewise<S: DataStream, T: SourceTransform>(
    stream: S,
    op: T,
    which_sources: Option<Vec<String>>,
) -> Result<Pipe<S, Sourcewise<T>>> {
    let op = Sourcewise::new(op, stream.sources(), which_sources)?;
    Ok(Pipe::new(stream, op))
}

/// Collapses every non-batch axis of the selected sources into one.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flatten;

impl Flatten {
    pub fn new<S: DataStream>(
        stream: S,
        which_sources: Option<Vec<String>>,
    ) -> Result<Pipe<S, Sourcewise<Flatten>>> {
        let op = Sourcewise::new(Flatten, stream.sources(), which_sources)?;
        let axis_labels = stream.axis_labels().map(|labels| {
            let mut labels = labels.clone();
            for source in op.which_sources() {
                let Some(old) = labels.get_mut(source) else {
                    continue;
                };
                *old = match (stream.produces_examples(), old.first()) {
                    (true, _) => vec!["feature".to_owned()],
                    (false, Some(batch)) => vec![batch.clone(), "feature".to_owned()],
                    (false, None) => vec!["feature".to_owned()],
                };
            }
            labels
        });
        Ok(Pipe::new(stream, op).with_axis_labels(axis_labels))
    }
}

impl SourceTransform for Flatten {
    fn transform_source_example(
        &mut self,
        example: SourceData,
        _source: &str,
    ) -> Result<SourceData> {
        Ok(example.map_arrays(|a| a.flatten())?)
    }

    fn transform_source_batch(&mut self, batch: SourceData, _source: &str) -> Result<SourceData> {
        Ok(match batch {
            SourceData::Array(a) => SourceData::Array(a.flatten_rows()?),
            list => list.map_arrays(|a| a.flatten())?,
        })
    }
}

/// `x * scale + shift` on the selected sources.
#[derive(Debug, Clone, Copy)]
pub struct ScaleAndShift {
    pub scale: f64,
    pub shift: f64,
}

impl ScaleAndShift {
    pub fn new<S: DataStream>(
        stream: S,
        scale: f64,
        shift: f64,
        which_sources: Option<Vec<String>>,
    ) -> Result<Pipe<S, Sourcewise<ScaleAndShift>>> {
        sourcewise(stream, ScaleAndShift { scale, shift }, which_sources)
    }
}

impl SourceTransform for ScaleAndShift {
    fn transform_any_source(
        &mut self,
        data: SourceData,
        _source: &str,
        _kind: Kind,
    ) -> Result<SourceData> {
        let Self { scale, shift } = *self;
        data.map_arrays(|a| Ok(a.scale_and_shift(scale, shift)))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Cast {
    pub dtype: DType,
}

impl Cast {
    pub fn new<S: DataStream>(
        stream: S,
        dtype: DType,
        which_sources: Option<Vec<String>>,
    ) -> Result<Pipe<S, Sourcewise<Cast>>> {
        sourcewise(stream, Cast { dtype }, which_sources)
    }
}

impl SourceTransform for Cast {
    fn transform_any_source(
        &mut self,
        data: SourceData,
        _source: &str,
        _kind: Kind,
    ) -> Result<SourceData> {
        let dtype = self.dtype;
        data.map_arrays(|a| Ok(a.cast(dtype)))
    }
}

/// Casts floating point sources to the configured float type. Integer
/// sources are left alone.
#[derive(Debug, Clone, Copy)]
pub struct ForceFloatX {
    pub float_x: DType,
}

impl ForceFloatX {
    pub fn new<S: DataStream>(
        stream: S,
        float_x: DType,
        which_sources: Option<Vec<String>>,
    ) -> Result<Pipe<S, Sourcewise<ForceFloatX>>> {
        if !float_x.is_float() {
            return Err(StreamError::config(format!(
                "float_x must be a floating point type, got {float_x}"
            )));
        }
        sourcewise(stream, ForceFloatX { float_x }, which_sources)
    }
}

impl SourceTransform for ForceFloatX {
    fn transform_any_source(
        &mut self,
        data: SourceData,
        _source: &str,
        _kind: Kind,
    ) -> Result<SourceData> {
        let float_x = self.float_x;
        data.map_arrays(|a: Array| {
            Ok(if a.dtype().is_float() && a.dtype() != float_x {
                a.cast(float_x)
            } else {
                a
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        schemes::SequentialScheme,
        storage::IndexableDataset,
        stream::DatasetStream,
        AxisLabels,
    };

    fn batches() -> DatasetStream<IndexableDataset> {
        let images = Array::from_shape_vec(&[4, 2, 2], (0..16).collect::<Vec<i32>>()).unwrap();
        let labels = Array::from_vec(vec![0.5f64, 1.5, 2.5, 3.5]);
        let dataset = IndexableDataset::new([
            ("images", SourceData::Array(images)),
            ("labels", SourceData::Array(labels)),
        ])
        .unwrap()
        .with_axis_labels(AxisLabels::from([(
            "images".to_owned(),
            vec!["batch".to_owned(), "height".to_owned(), "width".to_owned()],
        )]));
        DatasetStream::new(dataset, SequentialScheme::new(4, 2).unwrap()).unwrap()
    }

    #[test]
    fn flatten_rewrites_shapes_and_labels() {
        let mut stream = Flatten::new(batches(), Some(vec!["images".to_owned()])).unwrap();
        assert_eq!(
            stream.axis_labels().unwrap()["images"],
            vec!["batch".to_owned(), "feature".to_owned()]
        );
        let first = stream.get_epoch_iterator().unwrap().next().unwrap().unwrap();
        assert_eq!(first[0].as_array().unwrap().shape(), &[2, 4]);
        assert_eq!(first[1].as_array().unwrap().shape(), &[2]);
    }

    #[test]
    fn only_selected_sources_change() {
        let mut stream =
            ScaleAndShift::new(batches(), 2.0, 1.0, Some(vec!["labels".to_owned()])).unwrap();
        let first = stream.get_epoch_iterator().unwrap().next().unwrap().unwrap();
        assert_eq!(first[0].as_array().unwrap().dtype(), DType::I32);
        assert_eq!(
            first[1].as_array().unwrap().to_vec::<f64>().unwrap(),
            vec![2.0, 4.0]
        );
    }

    #[test]
    fn force_float_x_skips_integers() {
        let mut stream = ForceFloatX::new(batches(), DType::F32, None).unwrap();
        let first = stream.get_epoch_iterator().unwrap().next().unwrap().unwrap();
        assert_eq!(first[0].as_array().unwrap().dtype(), DType::I32);
        assert_eq!(first[1].as_array().unwrap().dtype(), DType::F32);
        assert!(ForceFloatX::new(batches(), DType::I64, None).is_err());
    }

    #[test]
    fn unknown_sources_are_rejected() {
        let err = Cast::new(batches(), DType::F32, Some(vec!["nope".to_owned()])).err().unwrap();
        assert!(err.is_config());
    }
}
