use std::{
    ops::Range,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use sluice_core::SourceData;
use tracing::{debug, info};

use crate::{
    error::{Result, StreamError},
    request::Request,
    resolve::{Identity, PathResolver},
    storage::{
        check_request, fancy_index::unsorted_fancy_index, registry, ContainerFile, Dataset,
    },
    AxisLabels, Data,
};

/// A contiguous sub-range of a split, relative to the split's first row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subset {
    pub start: Option<usize>,
    pub stop: Option<usize>,
    /// Only `None` and `Some(1)` are accepted.
    pub step: Option<usize>,
}

impl Subset {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn range(rows: Range<usize>) -> Self {
        Self {
            start: Some(rows.start),
            stop: Some(rows.end),
            step: None,
        }
    }

    /// Intersects this subset with `split`.
    fn apply(&self, split: &Range<usize>) -> Result<Range<usize>> {
        if !matches!(self.step, None | Some(1)) {
            return Err(StreamError::config(
                "subset slices may only have a step of 1",
            ));
        }
        let start = split.start + self.start.unwrap_or(0);
        let stop = match self.stop {
            Some(stop) => split.start + stop,
            None => split.end,
        }
        .min(split.end);
        if start > stop {
            return Err(StreamError::config(format!(
                "subset {:?}..{:?} is empty for a split of {} rows",
                self.start,
                self.stop,
                split.len()
            )));
        }
        Ok(start..stop)
    }
}

fn default_sort_indices() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitDatasetConfig {
    pub path: PathBuf,
    pub which_set: String,
    #[serde(default)]
    pub subset: Subset,
    /// Defaults to every source the split provides.
    #[serde(default)]
    pub sources: Option<Vec<String>>,
    #[serde(default)]
    pub load_in_memory: bool,
    #[serde(default = "default_sort_indices")]
    pub sort_indices: bool,
}

impl SplitDatasetConfig {
    pub fn new(path: impl Into<PathBuf>, which_set: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            which_set: which_set.into(),
            subset: Subset::all(),
            sources: None,
            load_in_memory: false,
            sort_indices: true,
        }
    }

    pub fn with_subset(mut self, subset: Subset) -> Self {
        self.subset = subset;
        self
    }

    pub fn with_sources<S: Into<String>>(mut self, sources: impl IntoIterator<Item = S>) -> Self {
        self.sources = Some(sources.into_iter().map(Into::into).collect());
        self
    }

    pub fn load_in_memory(mut self, load_in_memory: bool) -> Self {
        self.load_in_memory = load_in_memory;
        self
    }

    pub fn sort_indices(mut self, sort_indices: bool) -> Self {
        self.sort_indices = sort_indices;
        self
    }
}

struct ColumnInfo {
    file_source: usize,
    rows: Range<usize>,
    variable_length: bool,
}

struct Column {
    data: SourceData,
    shapes: Option<Vec<Vec<usize>>>,
}

/// Gives variable-length rows their stored shapes back.
fn reshape_rows(data: SourceData, shapes: &[Vec<usize>]) -> Result<SourceData> {
    match data {
        SourceData::List(rows) => rows
            .into_iter()
            .zip(shapes)
            .map(|(row, shape)| Ok(row.reshape(shape)?))
            .collect::<Result<Vec<_>>>()
            .map(SourceData::List),
        dense => Ok(dense),
    }
}

fn size_request() -> StreamError {
    StreamError::invalid_request("datasets cannot serve batch-size requests")
}

/// Rows a request touches, relative to the start of the subset.
fn request_rows(request: &Request) -> Vec<usize> {
    match request {
        Request::Index(i) => vec![*i],
        Request::Indices(indices) => indices.clone(),
        Request::Slice(rows) => rows.clone().collect(),
        Request::Size(_) => Vec::new(),
    }
}

/// One split of a container file, optionally restricted to a subset of its
/// rows and sources.
///
/// The file header is read at construction, so every configuration problem
/// (unknown split or source, sources of unequal length) surfaces there.
/// Data is only served between [`Dataset::open`] and [`Dataset::close`].
pub struct SplitDataset {
    config: SplitDatasetConfig,
    path: PathBuf,
    sources: Vec<String>,
    columns: Vec<ColumnInfo>,
    axis_labels: Option<AxisLabels>,
    num_examples: usize,
    handle: Option<Arc<ContainerFile>>,
    in_memory: Option<Vec<Column>>,
}

impl SplitDataset {
    pub fn new(config: SplitDatasetConfig) -> Result<Self> {
        Self::with_resolver(config, &Identity)
    }

    pub fn with_resolver(config: SplitDatasetConfig, resolver: &dyn PathResolver) -> Result<Self> {
        let path = resolver.resolve(&config.path);
        let file = registry::acquire(&path)?;
        let dataset = Self::from_file(config, path.clone(), &file);
        drop(file);
        registry::release(&path);
        dataset
    }

    fn from_file(config: SplitDatasetConfig, path: PathBuf, file: &ContainerFile) -> Result<Self> {
        let table = &file.header().splits;
        let split = config.which_set.as_str();
        let available = table.splits();
        if !available.contains(&split) {
            return Err(StreamError::config(format!(
                "'{split}' split is not provided by this dataset. \
                 Available splits are {available:?}"
            )));
        }
        table.num_examples(split)?;

        let provided = table.sources_of(split);
        let sources: Vec<String> = match &config.sources {
            Some(requested) => {
                let unknown = requested.iter().find(|s| !provided.contains(&s.as_str()));
                if let Some(unknown) = unknown {
                    return Err(StreamError::config(format!(
                        "source '{unknown}' is not provided by split '{split}'. \
                         Available sources are {provided:?}"
                    )));
                }
                requested.clone()
            }
            None => provided.iter().map(|s| s.to_string()).collect(),
        };

        let mut columns = Vec::with_capacity(sources.len());
        let mut axis_labels = AxisLabels::new();
        for source in &sources {
            let file_source = file.source_index(source).ok_or_else(|| {
                StreamError::config(format!(
                    "split table names source '{source}' which the file does not contain"
                ))
            })?;
            let header = &file.header().sources[file_source];
            let split_rows = table.range(split, source)?;
            if split_rows.end > header.num_rows() {
                return Err(StreamError::config(format!(
                    "split '{split}' ends at row {} but source '{source}' has {} rows",
                    split_rows.end,
                    header.num_rows()
                )));
            }
            let rows = config.subset.apply(&split_rows)?;
            if let Some(labels) = header.reader_axis_labels() {
                axis_labels.insert(source.clone(), labels);
            }
            columns.push(ColumnInfo {
                file_source,
                rows,
                variable_length: header.is_variable_length(),
            });
        }

        let num_examples = columns.first().map_or(0, |c| c.rows.len());
        if columns.iter().any(|c| c.rows.len() != num_examples) {
            return Err(StreamError::config(format!(
                "sources of split '{split}' have subsets of different lengths"
            )));
        }

        info!(
            path = %path.display(),
            split,
            num_examples,
            sources = ?sources,
            in_memory = config.load_in_memory,
            "loaded split dataset"
        );
        Ok(Self {
            config,
            path,
            sources,
            columns,
            axis_labels: (!axis_labels.is_empty()).then_some(axis_labels),
            num_examples,
            handle: None,
            in_memory: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &SplitDatasetConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some() || self.in_memory.is_some()
    }

    fn load(&self, file: &ContainerFile) -> Result<Vec<Column>> {
        self.columns
            .iter()
            .map(|info| {
                let data = file.read_slice(info.file_source, info.rows.clone())?;
                let rows: Vec<usize> = info.rows.clone().collect();
                Ok(Column {
                    data,
                    shapes: file.row_shapes(info.file_source, &rows),
                })
            })
            .collect()
    }

    fn read_column(
        &self,
        file: &ContainerFile,
        info: &ColumnInfo,
        request: &Request,
    ) -> Result<SourceData> {
        let offset = info.rows.start;
        let source = info.file_source;
        let data = match request {
            Request::Slice(rows) => {
                file.read_slice(source, rows.start + offset..rows.end + offset)?
            }
            Request::Index(i) => file.read_slice(source, i + offset..i + offset + 1)?,
            Request::Indices(indices) => {
                let rows: Vec<usize> = indices.iter().map(|i| i + offset).collect();
                if self.config.sort_indices {
                    unsorted_fancy_index(&rows, |sorted| file.read_sorted(source, sorted))?
                } else {
                    file.read_sorted(source, &rows)?
                }
            }
            Request::Size(_) => return Err(size_request()),
        };
        if !info.variable_length {
            return Ok(data);
        }
        let rows: Vec<usize> = request_rows(request).iter().map(|i| i + offset).collect();
        match file.row_shapes(source, &rows) {
            Some(shapes) => reshape_rows(data, &shapes),
            None => Ok(data),
        }
    }

    fn read_memory(column: &Column, request: &Request) -> Result<SourceData> {
        let data = match request {
            Request::Slice(rows) => column.data.slice(rows.clone())?,
            Request::Index(i) => column.data.slice(*i..i + 1)?,
            Request::Indices(indices) => column.data.select(indices)?,
            Request::Size(_) => return Err(size_request()),
        };
        match &column.shapes {
            Some(shapes) => {
                let shapes: Vec<Vec<usize>> = request_rows(request)
                    .into_iter()
                    .map(|i| shapes[i].clone())
                    .collect();
                reshape_rows(data, &shapes)
            }
            None => Ok(data),
        }
    }
}

impl Dataset for SplitDataset {
    fn sources(&self) -> &[String] {
        &self.sources
    }

    fn axis_labels(&self) -> Option<&AxisLabels> {
        self.axis_labels.as_ref()
    }

    fn num_examples(&self) -> usize {
        self.num_examples
    }

    fn open(&mut self) -> Result<()> {
        if self.config.load_in_memory {
            if self.in_memory.is_none() {
                let file = registry::acquire(&self.path)?;
                let loaded = self.load(&file);
                drop(file);
                registry::release(&self.path);
                self.in_memory = Some(loaded?);
                debug!(path = %self.path.display(), "materialized split in memory");
            }
        } else if self.handle.is_none() {
            self.handle = Some(registry::acquire(&self.path)?);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.handle.take().is_some() {
            registry::release(&self.path);
        }
        Ok(())
    }

    /// Serves slices and index lists of rows, plus `Request::Index` for a
    /// single row returned without the leading batch axis. `Request::Size`
    /// is rejected.
    fn get_data(&self, request: &Request) -> Result<Data> {
        check_request(request, self.num_examples)?;
        let data = if let Some(columns) = &self.in_memory {
            columns
                .iter()
                .map(|column| Self::read_memory(column, request))
                .collect::<Result<Data>>()?
        } else {
            let file = self
                .handle
                .as_ref()
                .ok_or_else(|| StreamError::NotOpen(self.path.clone()))?;
            self.columns
                .iter()
                .map(|info| self.read_column(file, info, request))
                .collect::<Result<Data>>()?
        };
        if matches!(request, Request::Index(_)) {
            return data
                .into_iter()
                .map(|column| Ok(SourceData::Array(column.example(0)?)))
                .collect();
        }
        Ok(data)
    }
}

impl Drop for SplitDataset {
    fn drop(&mut self) {
        if self.handle.take().is_some() {
            registry::release(&self.path);
        }
    }
}
