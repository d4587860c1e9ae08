//! A pull-based data pipeline: iteration schemes decide what to read,
//! datasets read it, and a chain of streams reshapes it on the way to the
//! consumer.

mod config;
mod error;
mod ext;
mod prefetch;
mod request;
mod resolve;
mod schemes;
mod storage;
mod stream;
mod transformers;

use std::collections::BTreeMap;

pub use sluice_core::{Array, DType, Shuffle, SourceData};

pub use config::{Config, CONFIG_ENV, DATA_PATH_ENV, FLOATX_ENV};
pub use error::{Kind, Result, StreamError};
pub use ext::DataStreamExt;
pub use prefetch::Prefetch;
pub use request::{Request, RequestIter, RequestKind};
pub use resolve::{DataPathResolver, Identity, PathResolver};
pub use schemes::{
    ConstantScheme, IterationScheme, SequentialExampleScheme, SequentialScheme,
    ShuffledExampleScheme, ShuffledScheme,
};
pub use storage::{
    open_handles, ContainerFile, ContainerHeader, ContainerWriter, Dataset, IndexableDataset,
    ShapesSidecar, SourceHeader, SplitDataset, SplitDatasetConfig, SplitDict, SplitRecord,
    SplitTable, Subset,
};
pub use stream::{DataStream, DatasetStream, DictIterator, EpochIterator, StreamState, Upstream};
pub use transformers::{
    sort_mapping, Batch, Cache, Cast, Filter, FilterSources, Flatten, ForceFloatX, Mapping,
    Merge, OnNonExistent, Padding, Pipe, Rename, ScaleAndShift, SourceTransform, Sourcewise,
    Strictness, Transform, Unpack,
};

/// Source name to the names of its axes.
pub type AxisLabels = BTreeMap<String, Vec<String>>;

/// One value per source, in the stream's source order.
pub type Data = Vec<SourceData>;
