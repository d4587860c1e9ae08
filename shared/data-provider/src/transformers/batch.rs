use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use sluice_core::{Array, SourceData};
use tracing::trace;

use crate::{
    error::{Result, StreamError},
    request::{Request, RequestIter, RequestKind},
    schemes::IterationScheme,
    stream::{DataStream, Upstream},
    transformers::reject_request,
    AxisLabels, Data,
};

/// What [`Batch`] does when upstream runs out in the middle of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strictness {
    /// Return the partial batch.
    #[default]
    Lenient,
    /// Drop the partial batch and end the epoch. The dropped examples are
    /// never seen.
    DropIncomplete,
    /// Fail with [`StreamError::IncompleteBatch`].
    Strict,
}

impl TryFrom<u8> for Strictness {
    type Error = StreamError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Strictness::Lenient),
            1 => Ok(Strictness::DropIncomplete),
            2 => Ok(Strictness::Strict),
            other => Err(StreamError::config(format!(
                "strictness must be 0, 1 or 2, got {other}"
            ))),
        }
    }
}

fn batch_size(request: Option<Request>) -> Result<usize> {
    match request {
        Some(Request::Size(size)) => Ok(size),
        other => Err(StreamError::invalid_request(format!(
            "expected a batch size request, got {other:?}"
        ))),
    }
}

fn check_batch_size_scheme(scheme: &dyn IterationScheme) -> Result<()> {
    match scheme.request_kind() {
        RequestKind::BatchSize => Ok(()),
        RequestKind::Example => Err(StreamError::config(
            "the iteration scheme must request batches, not individual examples",
        )),
        RequestKind::Batch => Err(StreamError::config(
            "the iteration scheme must request batch sizes, not example indices",
        )),
    }
}

/// Groups the examples of an example stream into batches whose sizes come
/// from an iteration scheme.
pub struct Batch<S> {
    upstream: Upstream<S>,
    scheme: Box<dyn IterationScheme>,
    strictness: Strictness,
    axis_labels: Option<AxisLabels>,
}

impl<S: DataStream> Batch<S> {
    pub fn new(
        stream: S,
        scheme: impl IterationScheme + 'static,
        strictness: Strictness,
    ) -> Result<Self> {
        if !stream.produces_examples() {
            return Err(StreamError::config(
                "the wrapped data stream must produce examples, not batches of examples",
            ));
        }
        check_batch_size_scheme(&scheme)?;
        let axis_labels = stream.axis_labels().map(|labels| {
            labels
                .iter()
                .map(|(source, labels)| {
                    let mut batched = Vec::with_capacity(labels.len() + 1);
                    batched.push("batch".to_owned());
                    batched.extend(labels.iter().cloned());
                    (source.clone(), batched)
                })
                .collect()
        });
        Ok(Self {
            upstream: Upstream::new(stream),
            scheme: Box::new(scheme),
            strictness,
            axis_labels,
        })
    }

    pub fn strictness(&self) -> Strictness {
        self.strictness
    }
}

impl<S: DataStream> DataStream for Batch<S> {
    fn sources(&self) -> &[String] {
        self.upstream.stream().sources()
    }

    fn produces_examples(&self) -> bool {
        false
    }

    fn axis_labels(&self) -> Option<&AxisLabels> {
        self.axis_labels.as_ref()
    }

    fn start_epoch(&mut self) -> Result<Option<RequestIter>> {
        self.upstream.start_epoch()?;
        Ok(Some(self.scheme.get_request_iterator()))
    }

    fn get_data(&mut self, request: Option<Request>) -> Result<Option<Data>> {
        let size = batch_size(request)?;
        let num_sources = self.sources().len();
        let mut columns: Vec<Vec<Array>> = vec![Vec::with_capacity(size); num_sources];
        let mut count = 0;
        while count < size {
            let Some(example) = self.upstream.pull()? else {
                if count == 0 {
                    return Ok(None);
                }
                match self.strictness {
                    Strictness::Lenient => break,
                    Strictness::DropIncomplete => {
                        trace!(dropped = count, "dropping incomplete batch");
                        return Ok(None);
                    }
                    Strictness::Strict => {
                        return Err(StreamError::IncompleteBatch {
                            requested: size,
                            provided: count,
                        })
                    }
                }
            };
            if example.len() != num_sources {
                return Err(StreamError::invalid_request(format!(
                    "example has {} sources, expected {num_sources}",
                    example.len()
                )));
            }
            for (column, value) in columns.iter_mut().zip(example) {
                let value = value.into_array().ok_or_else(|| {
                    StreamError::invalid_request("examples must hold one array per source")
                })?;
                column.push(value);
            }
            count += 1;
        }
        Ok(Some(
            columns.into_iter().map(SourceData::from_examples).collect(),
        ))
    }

    fn close(&mut self) -> Result<()> {
        self.upstream.close()
    }

    fn reset(&mut self) -> Result<()> {
        self.upstream.reset()
    }
}

/// Splits every batch of a batch stream back into single examples.
pub struct Unpack<S> {
    upstream: Upstream<S>,
    pending: VecDeque<Data>,
    axis_labels: Option<AxisLabels>,
}

impl<S: DataStream> Unpack<S> {
    pub fn new(stream: S) -> Result<Self> {
        if stream.produces_examples() {
            return Err(StreamError::config(
                "the wrapped data stream must produce batches, not examples",
            ));
        }
        let axis_labels = stream.axis_labels().map(|labels| {
            labels
                .iter()
                .map(|(source, labels)| (source.clone(), labels.iter().skip(1).cloned().collect()))
                .collect()
        });
        Ok(Self {
            upstream: Upstream::new(stream),
            pending: VecDeque::new(),
            axis_labels,
        })
    }

    fn unpack(batch: Data) -> Result<VecDeque<Data>> {
        let columns = batch
            .into_iter()
            .map(SourceData::into_examples)
            .collect::<Result<Vec<_>, _>>()?;
        let len = columns.first().map_or(0, Vec::len);
        if columns.iter().any(|c| c.len() != len) {
            return Err(StreamError::invalid_request(
                "all sources of a batch must hold the same number of examples",
            ));
        }
        let mut columns: Vec<_> = columns.into_iter().map(Vec::into_iter).collect();
        Ok((0..len)
            .map(|_| {
                columns
                    .iter_mut()
                    .filter_map(Iterator::next)
                    .map(SourceData::Array)
                    .collect()
            })
            .collect())
    }
}

impl<S: DataStream> DataStream for Unpack<S> {
    fn sources(&self) -> &[String] {
        self.upstream.stream().sources()
    }

    fn produces_examples(&self) -> bool {
        true
    }

    fn axis_labels(&self) -> Option<&AxisLabels> {
        self.axis_labels.as_ref()
    }

    fn start_epoch(&mut self) -> Result<Option<RequestIter>> {
        self.pending.clear();
        self.upstream.start_epoch()?;
        Ok(None)
    }

    fn get_data(&mut self, request: Option<Request>) -> Result<Option<Data>> {
        reject_request(request)?;
        loop {
            if let Some(example) = self.pending.pop_front() {
                return Ok(Some(example));
            }
            match self.upstream.pull()? {
                Some(batch) => self.pending = Self::unpack(batch)?,
                None => return Ok(None),
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.pending.clear();
        self.upstream.close()
    }

    fn reset(&mut self) -> Result<()> {
        self.pending.clear();
        self.upstream.reset()
    }
}

/// Re-cuts the batches of a batch stream to the sizes requested by its own
/// iteration scheme, buffering what is left over.
pub struct Cache<S> {
    upstream: Upstream<S>,
    scheme: Box<dyn IterationScheme>,
    buffer: Vec<VecDeque<Array>>,
}

impl<S: DataStream> Cache<S> {
    pub fn new(stream: S, scheme: impl IterationScheme + 'static) -> Result<Self> {
        if stream.produces_examples() {
            return Err(StreamError::config(
                "the wrapped data stream must produce batches, not examples",
            ));
        }
        check_batch_size_scheme(&scheme)?;
        let buffer = vec![VecDeque::new(); stream.sources().len()];
        Ok(Self {
            upstream: Upstream::new(stream),
            scheme: Box::new(scheme),
            buffer,
        })
    }

    fn buffered(&self) -> usize {
        self.buffer.first().map_or(0, VecDeque::len)
    }

    fn clear(&mut self) {
        self.buffer.iter_mut().for_each(VecDeque::clear);
    }

    /// Pulls one upstream batch into the buffer. `false` once upstream is
    /// exhausted.
    fn refill(&mut self) -> Result<bool> {
        let Some(batch) = self.upstream.pull()? else {
            return Ok(false);
        };
        for (buffer, data) in self.buffer.iter_mut().zip(batch) {
            buffer.extend(data.into_examples()?);
        }
        trace!(buffered = self.buffered(), "refilled cache");
        Ok(true)
    }
}

impl<S: DataStream> DataStream for Cache<S> {
    fn sources(&self) -> &[String] {
        self.upstream.stream().sources()
    }

    fn produces_examples(&self) -> bool {
        false
    }

    fn axis_labels(&self) -> Option<&AxisLabels> {
        self.upstream.stream().axis_labels()
    }

    fn start_epoch(&mut self) -> Result<Option<RequestIter>> {
        self.clear();
        self.upstream.start_epoch()?;
        Ok(Some(self.scheme.get_request_iterator()))
    }

    fn get_data(&mut self, request: Option<Request>) -> Result<Option<Data>> {
        let size = batch_size(request)?;
        if size > self.buffered() && !self.refill()? && self.buffered() == 0 {
            return Ok(None);
        }
        Ok(Some(
            self.buffer
                .iter_mut()
                .map(|buffer| {
                    let take = size.min(buffer.len());
                    SourceData::from_examples(buffer.drain(..take).collect())
                })
                .collect(),
        ))
    }

    fn close(&mut self) -> Result<()> {
        self.clear();
        self.upstream.close()
    }

    fn reset(&mut self) -> Result<()> {
        self.clear();
        self.upstream.reset()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn strictness_from_level() {
        assert_eq!(Strictness::try_from(0).unwrap(), Strictness::Lenient);
        assert_eq!(Strictness::try_from(1).unwrap(), Strictness::DropIncomplete);
        assert_eq!(Strictness::try_from(2).unwrap(), Strictness::Strict);
        assert!(Strictness::try_from(3).unwrap_err().is_config());
    }

    #[test]
    fn unpack_transposes_batches() {
        let batch = vec![
            SourceData::Array(Array::from_vec(vec![1i32, 2])),
            SourceData::List(vec![
                Array::from_vec(vec![1u8]),
                Array::from_vec(vec![1u8, 2]),
            ]),
        ];
        let examples = Unpack::<Box<dyn DataStream>>::unpack(batch).unwrap();
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[1][0], SourceData::Array(Array::scalar(2i32)));
        assert_eq!(
            examples[1][1],
            SourceData::Array(Array::from_vec(vec![1u8, 2]))
        );
    }
}
