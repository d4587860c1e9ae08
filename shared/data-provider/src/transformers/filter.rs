use crate::{
    error::{Result, StreamError},
    request::{Request, RequestIter},
    stream::{DataStream, Upstream},
    transformers::reject_request,
    AxisLabels, Data,
};

/// Drops the examples `predicate` rejects.
pub struct Filter<S, P> {
    upstream: Upstream<S>,
    predicate: P,
}

impl<S, P> Filter<S, P>
where
    S: DataStream,
    P: FnMut(&Data) -> bool + Send,
{
    pub fn new(stream: S, predicate: P) -> Result<Self> {
        if !stream.produces_examples() {
            return Err(StreamError::config(
                "filter only works on example streams, filter before batching",
            ));
        }
        Ok(Self {
            upstream: Upstream::new(stream),
            predicate,
        })
    }
}

impl<S, P> DataStream for Filter<S, P>
where
    S: DataStream,
    P: FnMut(&Data) -> bool + Send,
{
    fn sources(&self) -> &[String] {
        self.upstream.stream().sources()
    }

    fn produces_examples(&self) -> bool {
        true
    }

    fn axis_labels(&self) -> Option<&AxisLabels> {
        self.upstream.stream().axis_labels()
    }

    fn start_epoch(&mut self) -> Result<Option<RequestIter>> {
        self.upstream.start_epoch()?;
        Ok(None)
    }

    fn get_data(&mut self, request: Option<Request>) -> Result<Option<Data>> {
        reject_request(request)?;
        while let Some(example) = self.upstream.pull()? {
            if (self.predicate)(&example) {
                return Ok(Some(example));
            }
        }
        Ok(None)
    }

    fn close(&mut self) -> Result<()> {
        self.upstream.close()
    }

    fn reset(&mut self) -> Result<()> {
        self.upstream.reset()
    }
}
