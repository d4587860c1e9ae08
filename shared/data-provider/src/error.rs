use std::{fmt, io, path::PathBuf};

use sluice_core::ArrayError;
use thiserror::Error;

/// Whether a unit of data is a single example or a batch of examples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Example,
    Batch,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Example => f.write_str("example"),
            Kind::Batch => f.write_str("batch"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{transformer} does not support {kind} input")]
    Unsupported {
        transformer: &'static str,
        kind: Kind,
    },

    #[error("could only provide {provided} of the {requested} requested examples")]
    IncompleteBatch { requested: usize, provided: usize },

    #[error("no open handle for file {0}")]
    NotOpen(PathBuf),

    #[error("no epoch in progress, call get_epoch_iterator first")]
    NoEpoch,

    #[error("malformed container file {path}: {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Array(#[from] ArrayError),

    #[error(transparent)]
    Mapping(#[from] anyhow::Error),

    #[error("background prefetch worker disconnected")]
    WorkerDisconnected,
}

impl StreamError {
    pub fn config(message: impl Into<String>) -> Self {
        StreamError::Config(message.into())
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        StreamError::InvalidRequest(message.into())
    }

    /// Configuration errors only ever come out of constructors.
    pub fn is_config(&self) -> bool {
        matches!(self, StreamError::Config(_))
    }
}

pub type Result<T, E = StreamError> = std::result::Result<T, E>;
