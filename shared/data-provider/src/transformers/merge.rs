use std::collections::HashSet;

use crate::{
    error::{Result, StreamError},
    request::{Request, RequestIter},
    stream::{DataStream, Upstream},
    transformers::reject_request,
    AxisLabels, Data,
};

/// Pulls from several streams in lockstep and concatenates their sources.
/// The epoch ends as soon as any of them runs out.
pub struct Merge {
    streams: Vec<Upstream<Box<dyn DataStream>>>,
    sources: Vec<String>,
    produces_examples: bool,
    axis_labels: Option<AxisLabels>,
}

impl Merge {
    /// `sources` names the merged sources, as many as the streams provide
    /// together.
    pub fn new(streams: Vec<Box<dyn DataStream>>, sources: Vec<String>) -> Result<Self> {
        let Some(first) = streams.first() else {
            return Err(StreamError::config("merge needs at least one data stream"));
        };
        let produces_examples = first.produces_examples();
        if streams.iter().any(|s| s.produces_examples() != produces_examples) {
            return Err(StreamError::config(
                "all data streams must produce the same type of output (batches or examples)",
            ));
        }
        let provided: usize = streams.iter().map(|s| s.sources().len()).sum();
        if provided != sources.len() {
            return Err(StreamError::config(format!(
                "wrong number of sources given: the data streams provide {provided}, got {}",
                sources.len()
            )));
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = sources.iter().find(|s| !seen.insert(s.as_str())) {
            return Err(StreamError::config(format!(
                "source '{duplicate}' named twice"
            )));
        }
        Ok(Self {
            streams: streams.into_iter().map(Upstream::new).collect(),
            sources,
            produces_examples,
            axis_labels: None,
        })
    }

    pub fn with_axis_labels(mut self, axis_labels: AxisLabels) -> Self {
        self.axis_labels = (!axis_labels.is_empty()).then_some(axis_labels);
        self
    }
}

impl DataStream for Merge {
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
        for stream in &mut self.streams {
            stream.start_epoch()?;
        }
        Ok(None)
    }

    fn get_data(&mut self, request: Option<Request>) -> Result<Option<Data>> {
        reject_request(request)?;
        let mut merged = Vec::with_capacity(self.sources.len());
        for stream in &mut self.streams {
            match stream.pull()? {
                Some(data) => merged.extend(data),
                None => return Ok(None),
            }
        }
        Ok(Some(merged))
    }

    fn close(&mut self) -> Result<()> {
        self.streams.iter_mut().try_for_each(Upstream::close)
    }

    fn reset(&mut self) -> Result<()> {
        self.streams.iter_mut().try_for_each(Upstream::reset)
    }
}
