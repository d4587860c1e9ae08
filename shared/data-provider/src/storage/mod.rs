mod container;
mod fancy_index;
mod indexable;
mod registry;
mod split_dataset;
mod split_table;

pub use container::{ContainerFile, ContainerHeader, ContainerWriter, ShapesSidecar, SourceHeader};
pub use indexable::IndexableDataset;
pub use registry::open_handles;
pub use split_dataset::{SplitDataset, SplitDatasetConfig, Subset};
pub use split_table::{SplitDict, SplitRecord, SplitTable};

use crate::{
    error::{Result, StreamError},
    request::Request,
    AxisLabels, Data,
};

/// A fixed collection of examples with named sources.
pub trait Dataset: Send {
    fn sources(&self) -> &[String];

    fn axis_labels(&self) -> Option<&AxisLabels> {
        None
    }

    fn num_examples(&self) -> usize;

    /// Acquires whatever the dataset needs to serve requests. Idempotent.
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Data for every source, in [`Dataset::sources`] order.
    fn get_data(&self, request: &Request) -> Result<Data>;
}

/// Bounds-checks the example indices a request refers to.
pub(crate) fn check_request(request: &Request, num_examples: usize) -> Result<()> {
    let out_of_range = |index: usize| {
        StreamError::invalid_request(format!(
            "index {index} out of range for a dataset of {num_examples} examples"
        ))
    };
    match request {
        Request::Index(i) if *i >= num_examples => Err(out_of_range(*i)),
        Request::Indices(indices) => match indices.iter().find(|&&i| i >= num_examples) {
            Some(&i) => Err(out_of_range(i)),
            None => Ok(()),
        },
        Request::Slice(rows) if rows.start > rows.end || rows.end > num_examples => {
            Err(StreamError::invalid_request(format!(
                "slice {}..{} out of range for a dataset of {num_examples} examples",
                rows.start, rows.end
            )))
        }
        Request::Size(_) => Err(StreamError::invalid_request(
            "datasets cannot serve batch-size requests",
        )),
        _ => Ok(()),
    }
}
