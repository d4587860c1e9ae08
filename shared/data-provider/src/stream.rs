use std::collections::HashMap;

use sluice_core::SourceData;
use tracing::{debug, trace};

use crate::{
    error::{Result, StreamError},
    request::{Request, RequestIter, RequestKind},
    schemes::IterationScheme,
    storage::Dataset,
    AxisLabels, Data,
};

/// Anything that hands out data one example or one batch at a time.
///
/// An epoch starts with [`DataStream::start_epoch`], which returns the
/// requests to feed back into [`DataStream::get_data`] (or `None` when the
/// stream pulls from upstream and takes no requests). `get_data` returning
/// `Ok(None)` ends the epoch.
pub trait DataStream: Send {
    fn sources(&self) -> &[String];

    fn produces_examples(&self) -> bool;

    fn axis_labels(&self) -> Option<&AxisLabels>;

    fn start_epoch(&mut self) -> Result<Option<RequestIter>>;

    fn get_data(&mut self, request: Option<Request>) -> Result<Option<Data>>;

    /// Called once the current epoch has run dry.
    fn finish_epoch(&mut self) {}

    fn close(&mut self) -> Result<()>;

    fn reset(&mut self) -> Result<()>;

    fn get_epoch_iterator<'a>(&'a mut self) -> Result<EpochIterator<'a>>
    where
        Self: Sized + 'a,
    {
        EpochIterator::new(self)
    }
}

impl<S: DataStream + ?Sized> DataStream for Box<S> {
    fn sources(&self) -> &[String] {
        (**self).sources()
    }

    fn produces_examples(&self) -> bool {
        (**self).produces_examples()
    }

    fn axis_labels(&self) -> Option<&AxisLabels> {
        (**self).axis_labels()
    }

    fn start_epoch(&mut self) -> Result<Option<RequestIter>> {
        (**self).start_epoch()
    }

    fn get_data(&mut self, request: Option<Request>) -> Result<Option<Data>> {
        (**self).get_data(request)
    }

    fn finish_epoch(&mut self) {
        (**self).finish_epoch()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }
}

/// Pulls the next item of the current epoch: the next request is fed to
/// `get_data` when the stream takes requests, otherwise `get_data(None)`.
fn pull<S: DataStream + ?Sized>(
    stream: &mut S,
    requests: Option<&mut RequestIter>,
) -> Result<Option<Data>> {
    let data = match requests {
        Some(requests) => match requests.next() {
            Some(request) => stream.get_data(Some(request))?,
            None => None,
        },
        None => stream.get_data(None)?,
    };
    if data.is_none() {
        stream.finish_epoch();
    }
    Ok(data)
}

/// The wrapped stream of a transformer, together with the requests of its
/// current epoch.
pub struct Upstream<S> {
    stream: S,
    /// `None` until an epoch has been started.
    requests: Option<Option<RequestIter>>,
}

impl<S: DataStream> Upstream<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            requests: None,
        }
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    pub fn start_epoch(&mut self) -> Result<()> {
        self.requests = Some(self.stream.start_epoch()?);
        Ok(())
    }

    pub fn pull(&mut self) -> Result<Option<Data>> {
        let requests = self.requests.as_mut().ok_or(StreamError::NoEpoch)?;
        pull(&mut self.stream, requests.as_mut())
    }

    pub fn close(&mut self) -> Result<()> {
        self.requests = None;
        self.stream.close()
    }

    pub fn reset(&mut self) -> Result<()> {
        self.requests = None;
        self.stream.reset()
    }
}

/// One epoch over a stream. Ends after the first `None` or error.
pub struct EpochIterator<'a> {
    stream: &'a mut (dyn DataStream + 'a),
    requests: Option<RequestIter>,
    done: bool,
}

impl<'a> EpochIterator<'a> {
    pub fn new(stream: &'a mut (dyn DataStream + 'a)) -> Result<Self> {
        let requests = stream.start_epoch()?;
        trace!(sources = ?stream.sources(), "started epoch");
        Ok(Self {
            stream,
            requests,
            done: false,
        })
    }

    pub fn sources(&self) -> &[String] {
        self.stream.sources()
    }

    /// Yields each item keyed by source name instead.
    pub fn as_dict(self) -> DictIterator<'a> {
        DictIterator { inner: self }
    }
}

impl Iterator for EpochIterator<'_> {
    type Item = Result<Data>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = pull(&mut *self.stream, self.requests.as_mut()).transpose();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}

pub struct DictIterator<'a> {
    inner: EpochIterator<'a>,
}

impl Iterator for DictIterator<'_> {
    type Item = Result<HashMap<String, SourceData>>;

    fn next(&mut self) -> Option<Self::Item> {
        let data = self.inner.next()?;
        Some(data.map(|data| {
            self.inner
                .sources()
                .iter()
                .cloned()
                .zip(data)
                .collect()
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Closed,
    Opened,
    EpochActive,
    EpochExhausted,
}

/// Serves requests from an iteration scheme straight out of a dataset.
pub struct DatasetStream<D> {
    dataset: D,
    scheme: Box<dyn IterationScheme>,
    state: StreamState,
}

impl<D: Dataset> DatasetStream<D> {
    pub fn new(dataset: D, scheme: impl IterationScheme + 'static) -> Result<Self> {
        if scheme.request_kind() == RequestKind::BatchSize {
            return Err(StreamError::config(
                "a dataset stream needs a scheme that requests examples or index batches, \
                 not batch sizes",
            ));
        }
        Ok(Self {
            dataset,
            scheme: Box::new(scheme),
            state: StreamState::Closed,
        })
    }

    pub fn dataset(&self) -> &D {
        &self.dataset
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    fn ensure_open(&mut self) -> Result<()> {
        if self.state == StreamState::Closed {
            self.dataset.open()?;
            self.state = StreamState::Opened;
            debug!(sources = ?self.dataset.sources(), "opened dataset stream");
        }
        Ok(())
    }
}

impl<D: Dataset> DataStream for DatasetStream<D> {
    fn sources(&self) -> &[String] {
        self.dataset.sources()
    }

    fn produces_examples(&self) -> bool {
        self.scheme.requests_examples()
    }

    fn axis_labels(&self) -> Option<&AxisLabels> {
        self.dataset.axis_labels()
    }

    fn start_epoch(&mut self) -> Result<Option<RequestIter>> {
        self.ensure_open()?;
        self.state = StreamState::EpochActive;
        Ok(Some(self.scheme.get_request_iterator()))
    }

    fn get_data(&mut self, request: Option<Request>) -> Result<Option<Data>> {
        let request = request
            .ok_or_else(|| StreamError::invalid_request("a dataset stream needs a request"))?;
        if request.requests_examples() != self.produces_examples() {
            return Err(StreamError::invalid_request(format!(
                "got {request:?} but this stream produces {}",
                if self.produces_examples() {
                    "examples"
                } else {
                    "batches"
                }
            )));
        }
        self.ensure_open()?;
        self.dataset.get_data(&request).map(Some)
    }

    fn finish_epoch(&mut self) {
        if self.state == StreamState::EpochActive {
            self.state = StreamState::EpochExhausted;
        }
    }

    fn close(&mut self) -> Result<()> {
        self.dataset.close()?;
        self.state = StreamState::Closed;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        if self.state != StreamState::Closed {
            self.state = StreamState::Opened;
        }
        Ok(())
    }
}
