//! Stages that wrap exactly one upstream stream (or, for [`Merge`], several)
//! and rework what it produces.

mod batch;
mod filter;
mod mapping;
mod merge;
mod padding;
mod rename;
mod sourcewise;

pub use batch::{Batch, Cache, Strictness, Unpack};
pub use filter::Filter;
pub use mapping::{sort_mapping, Mapping};
pub use merge::Merge;
pub use padding::Padding;
pub use rename::{FilterSources, OnNonExistent, Rename};
pub use sourcewise::{Cast, Flatten, ForceFloatX, ScaleAndShift, SourceTransform, Sourcewise};

use std::any::type_name;

use crate::{
    error::{Kind, Result, StreamError},
    request::{Request, RequestIter},
    stream::{DataStream, Upstream},
    AxisLabels, Data,
};

/// Last path segment of a type name, without generic arguments.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let name = type_name::<T>();
    let name = name.split('<').next().unwrap_or(name);
    name.rsplit("::").next().unwrap_or(name)
}

/// A per-item rewrite applied by [`Pipe`].
///
/// Implement `transform_any` when examples and batches are handled the same
/// way, or the two specific methods otherwise.
pub trait Transform: Send {
    fn transform_any(&mut self, data: Data, kind: Kind) -> Result<Data> {
        let _ = data;
        Err(StreamError::Unsupported {
            transformer: short_type_name::<Self>(),
            kind,
        })
    }

    fn transform_example(&mut self, example: Data) -> Result<Data> {
        self.transform_any(example, Kind::Example)
    }

    fn transform_batch(&mut self, batch: Data) -> Result<Data> {
        self.transform_any(batch, Kind::Batch)
    }
}

/// A one-in, one-out stage: every item pulled from upstream goes through
/// the transform. Mode is always the upstream's; sources and axis labels
/// default to the upstream's.
pub struct Pipe<S, T> {
    upstream: Upstream<S>,
    transform: T,
    sources: Vec<String>,
    axis_labels: Option<AxisLabels>,
    produces_examples: bool,
}

impl<S: DataStream, T: Transform> Pipe<S, T> {
    pub fn new(stream: S, transform: T) -> Self {
        Self {
            sources: stream.sources().to_vec(),
            axis_labels: stream.axis_labels().cloned(),
            produces_examples: stream.produces_examples(),
            upstream: Upstream::new(stream),
            transform,
        }
    }

    pub(crate) fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }

    pub(crate) fn with_axis_labels(mut self, axis_labels: Option<AxisLabels>) -> Self {
        self.axis_labels = axis_labels.filter(|labels| !labels.is_empty());
        self
    }

    pub fn upstream(&self) -> &S {
        self.upstream.stream()
    }

    pub fn transform(&self) -> &T {
        &self.transform
    }

    pub fn into_inner(self) -> S {
        self.upstream.into_inner()
    }
}

impl<S: DataStream, T: Transform> DataStream for Pipe<S, T> {
    fn sources(&self) -> &[String] {
        &self.sources
    }

    fn produces_examples(&self) -> bool {
        self.produces_examples
    }

    fn axis_labels(&self) -> Option<&AxisLabels> {
        self.axis_labels.as_ref()
    }

    fn start_epoch(&mut self) -> Result<Option<RequestIter>> {
        self.upstream.start_epoch()?;
        Ok(None)
    }

    fn get_data(&mut self, request: Option<Request>) -> Result<Option<Data>> {
        reject_request(request)?;
        let Some(data) = self.upstream.pull()? else {
            return Ok(None);
        };
        let data = if self.produces_examples {
            self.transform.transform_example(data)?
        } else {
            self.transform.transform_batch(data)?
        };
        Ok(Some(data))
    }

    fn close(&mut self) -> Result<()> {
        self.upstream.close()
    }

    fn reset(&mut self) -> Result<()> {
        self.upstream.reset()
    }
}

/// Transformers pull from upstream and take no requests of their own.
pub(crate) fn reject_request(request: Option<Request>) -> Result<()> {
    match request {
        None => Ok(()),
        Some(request) => Err(StreamError::invalid_request(format!(
            "{request:?} given to a stream that takes no requests"
        ))),
    }
}

/// Errors unless every name in `names` is one of `sources`.
pub(crate) fn check_known_sources<'a>(
    names: impl IntoIterator<Item = &'a String>,
    sources: &[String],
) -> Result<()> {
    for name in names {
        if !sources.contains(name) {
            return Err(StreamError::config(format!(
                "source '{name}' is not one of the stream's sources {sources:?}"
            )));
        }
    }
    Ok(())
}
