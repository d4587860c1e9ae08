use std::ops::Range;

use serde::{Deserialize, Serialize};

/// What a stream is asked for on each step of an epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// A single example.
    Index(usize),
    /// A batch made of these examples, in this order.
    Indices(Vec<usize>),
    /// A batch made of a contiguous run of examples.
    Slice(Range<usize>),
    /// A batch of this many examples, taken from whatever comes next.
    Size(usize),
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::Index(_) => RequestKind::Example,
            Request::Indices(_) | Request::Slice(_) => RequestKind::Batch,
            Request::Size(_) => RequestKind::BatchSize,
        }
    }

    pub fn requests_examples(&self) -> bool {
        self.kind().requests_examples()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Example,
    Batch,
    BatchSize,
}

impl RequestKind {
    pub fn requests_examples(&self) -> bool {
        matches!(self, RequestKind::Example)
    }
}

pub type RequestIter = Box<dyn Iterator<Item = Request> + Send>;
