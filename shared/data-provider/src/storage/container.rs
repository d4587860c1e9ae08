use std::{
    fs::File,
    io::{BufWriter, Write},
    ops::Range,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use sluice_core::{Array, DType, SourceData};
use tracing::{debug, info};

use crate::{
    error::{Result, StreamError},
    storage::SplitTable,
};

const MAGIC: &[u8; 4] = b"SLCE";
const VERSION: u32 = 1;
const PREAMBLE_LEN: usize = MAGIC.len() + 4 + 8;

/// Everything needed to locate the sources stored in a container, encoded
/// with postcard right after the fixed preamble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerHeader {
    pub sources: Vec<SourceHeader>,
    pub splits: SplitTable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceHeader {
    pub name: String,
    pub dtype: DType,
    /// Full array shape for dense sources, `[rows]` for variable-length ones.
    pub shape: Vec<usize>,
    /// Byte offset of the element data, relative to the end of the header.
    pub offset: u64,
    pub byte_len: u64,
    pub axis_labels: Option<Vec<String>>,
    /// Present for variable-length sources only.
    pub shapes: Option<ShapesSidecar>,
}

/// Per-row shapes of a variable-length source, stored as `rows * ndim`
/// little-endian u64 values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapesSidecar {
    pub ndim: usize,
    pub offset: u64,
    pub labels: Option<Vec<String>>,
}

impl SourceHeader {
    pub fn is_variable_length(&self) -> bool {
        self.shapes.is_some()
    }

    pub fn num_rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Labels of the source as seen by a reader: the row label followed by
    /// the per-row shape labels for variable-length sources.
    pub fn reader_axis_labels(&self) -> Option<Vec<String>> {
        match &self.shapes {
            None => self.axis_labels.clone(),
            Some(sidecar) => {
                let mut labels = self.axis_labels.clone()?;
                labels.extend(sidecar.labels.clone()?);
                Some(labels)
            }
        }
    }
}

struct RaggedIndex {
    /// Element offsets, one more than there are rows.
    offsets: Vec<usize>,
    shapes: Vec<Vec<usize>>,
}

/// A read-only, memory-mapped container file.
pub struct ContainerFile {
    path: PathBuf,
    mmap: memmap2::Mmap,
    header: ContainerHeader,
    data_start: usize,
    ragged: Vec<Option<RaggedIndex>>,
}

fn format_error(path: &Path, reason: impl Into<String>) -> StreamError {
    StreamError::Format {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn read_u64s(bytes: &[u8]) -> Vec<u64> {
    bytes
        .chunks_exact(8)
        .map(|chunk| {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            u64::from_le_bytes(word)
        })
        .collect()
}

fn checked_product(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

impl ContainerFile {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        if (file.metadata()?.len() as usize) < PREAMBLE_LEN {
            return Err(format_error(path, "file is too short"));
        }
        let mmap = unsafe { memmap2::MmapOptions::new().map(&file)? };

        if &mmap[..MAGIC.len()] != MAGIC {
            return Err(format_error(path, "bad magic bytes"));
        }
        let mut word = [0u8; 4];
        word.copy_from_slice(&mmap[4..8]);
        let version = u32::from_le_bytes(word);
        if version != VERSION {
            return Err(format_error(path, format!("unsupported version {version}")));
        }
        let mut word = [0u8; 8];
        word.copy_from_slice(&mmap[8..PREAMBLE_LEN]);
        let header_len = u64::from_le_bytes(word) as usize;
        let data_start = PREAMBLE_LEN
            .checked_add(header_len)
            .filter(|&end| end <= mmap.len())
            .ok_or_else(|| format_error(path, "header runs past the end of the file"))?;
        let header: ContainerHeader = postcard::from_bytes(&mmap[PREAMBLE_LEN..data_start])
            .map_err(|e| format_error(path, format!("undecodable header: {e}")))?;

        let data_len = mmap.len() - data_start;
        let mut ragged = Vec::with_capacity(header.sources.len());
        for source in &header.sources {
            let end = source.offset.checked_add(source.byte_len);
            if end.map_or(true, |end| end as usize > data_len) {
                return Err(format_error(
                    path,
                    format!("data of source '{}' runs past the end of the file", source.name),
                ));
            }
            let item = source.dtype.size_in_bytes();
            match &source.shapes {
                None => {
                    if source.shape.is_empty() {
                        return Err(format_error(
                            path,
                            format!("source '{}' needs at least one dimension", source.name),
                        ));
                    }
                    let expected = checked_product(&source.shape)
                        .and_then(|elems| elems.checked_mul(item))
                        .ok_or_else(|| {
                            format_error(
                                path,
                                format!("shape of source '{}' is too large", source.name),
                            )
                        })?;
                    if expected != source.byte_len as usize {
                        return Err(format_error(
                            path,
                            format!(
                                "source '{}' has {} bytes, its shape {:?} needs {expected}",
                                source.name, source.byte_len, source.shape
                            ),
                        ));
                    }
                    ragged.push(None);
                }
                Some(sidecar) => {
                    if source.shape.len() != 1 {
                        return Err(format_error(
                            path,
                            format!(
                                "variable-length source '{}' must have exactly one dimension",
                                source.name
                            ),
                        ));
                    }
                    let rows = source.num_rows();
                    let start = sidecar.offset as usize;
                    let end = rows
                        .checked_mul(sidecar.ndim)
                        .and_then(|dims| dims.checked_mul(8))
                        .and_then(|len| start.checked_add(len))
                        .filter(|&end| end <= data_len)
                        .ok_or_else(|| {
                            format_error(
                                path,
                                format!(
                                    "shapes of source '{}' run past the end of the file",
                                    source.name
                                ),
                            )
                        })?;
                    let dims = read_u64s(&mmap[data_start + start..data_start + end]);
                    let shapes: Vec<Vec<usize>> = if sidecar.ndim == 0 {
                        vec![Vec::new(); rows]
                    } else {
                        dims.chunks_exact(sidecar.ndim)
                            .map(|shape| shape.iter().map(|&d| d as usize).collect())
                            .collect()
                    };
                    let mut offsets = Vec::with_capacity(rows + 1);
                    offsets.push(0);
                    let mut total = 0usize;
                    for shape in &shapes {
                        total = checked_product(shape)
                            .and_then(|elems| total.checked_add(elems))
                            .ok_or_else(|| {
                                format_error(
                                    path,
                                    format!("row shapes of source '{}' are too large", source.name),
                                )
                            })?;
                        offsets.push(total);
                    }
                    if total.checked_mul(item) != Some(source.byte_len as usize) {
                        return Err(format_error(
                            path,
                            format!("row shapes of source '{}' do not match its data", source.name),
                        ));
                    }
                    ragged.push(Some(RaggedIndex { offsets, shapes }));
                }
            }
        }

        debug!(
            path = %path.display(),
            sources = header.sources.len(),
            "opened container"
        );
        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            header,
            data_start,
            ragged,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    pub fn source_index(&self, name: &str) -> Option<usize> {
        self.header.sources.iter().position(|s| s.name == name)
    }

    fn source_bytes(&self, source: usize) -> &[u8] {
        let header = &self.header.sources[source];
        let start = self.data_start + header.offset as usize;
        &self.mmap[start..start + header.byte_len as usize]
    }

    fn check_rows(&self, source: usize, rows: &Range<usize>) -> Result<()> {
        let len = self.header.sources[source].num_rows();
        if rows.start > rows.end || rows.end > len {
            return Err(StreamError::invalid_request(format!(
                "rows {}..{} out of range for source '{}' with {len} rows",
                rows.start, rows.end, self.header.sources[source].name
            )));
        }
        Ok(())
    }

    /// Reads a contiguous run of rows. Variable-length rows come back flat,
    /// one 1-D array per row.
    pub fn read_slice(&self, source: usize, rows: Range<usize>) -> Result<SourceData> {
        self.check_rows(source, &rows)?;
        let header = &self.header.sources[source];
        let item = header.dtype.size_in_bytes();
        let bytes = self.source_bytes(source);
        match &self.ragged[source] {
            None => {
                let row_elems: usize = header.shape[1..].iter().product();
                let row_bytes = row_elems * item;
                let mut shape = header.shape.clone();
                shape[0] = rows.len();
                let chunk = &bytes[rows.start * row_bytes..rows.end * row_bytes];
                Ok(SourceData::Array(Array::from_le_bytes(header.dtype, &shape, chunk)?))
            }
            Some(index) => rows
                .map(|row| {
                    let (start, stop) = (index.offsets[row], index.offsets[row + 1]);
                    let chunk = &bytes[start * item..stop * item];
                    Ok(Array::from_le_bytes(header.dtype, &[stop - start], chunk)?)
                })
                .collect::<Result<Vec<_>>>()
                .map(SourceData::List),
        }
    }

    /// Reads rows given in ascending order, one read per contiguous run.
    pub fn read_sorted(&self, source: usize, rows: &[usize]) -> Result<SourceData> {
        if rows.windows(2).any(|w| w[0] > w[1]) {
            return Err(StreamError::invalid_request(
                "indices must be in ascending order",
            ));
        }
        let mut runs: Vec<Range<usize>> = Vec::new();
        for &row in rows {
            match runs.last_mut() {
                Some(run) if run.end == row => run.end += 1,
                _ => runs.push(row..row + 1),
            }
        }
        if runs.is_empty() {
            return self.read_slice(source, 0..0);
        }
        let parts = runs
            .into_iter()
            .map(|run| self.read_slice(source, run))
            .collect::<Result<Vec<_>>>()?;
        if self.ragged[source].is_some() {
            let mut rows = Vec::with_capacity(rows.len());
            for part in parts {
                rows.extend(part.into_examples()?);
            }
            return Ok(SourceData::List(rows));
        }
        let arrays = parts
            .into_iter()
            .filter_map(SourceData::into_array)
            .collect::<Vec<_>>();
        Ok(SourceData::Array(Array::concatenate(&arrays)?))
    }

    /// Per-row shapes of a variable-length source, `None` for dense ones.
    pub fn row_shapes(&self, source: usize, rows: &[usize]) -> Option<Vec<Vec<usize>>> {
        let index = self.ragged[source].as_ref()?;
        Some(
            rows.iter()
                .filter_map(|&row| index.shapes.get(row).cloned())
                .collect(),
        )
    }
}

enum PendingSource {
    Dense {
        name: String,
        array: Array,
        axis_labels: Option<Vec<String>>,
    },
    Ragged {
        name: String,
        rows: Vec<Array>,
        axis_labels: Option<Vec<String>>,
    },
}

impl PendingSource {
    fn name(&self) -> &str {
        match self {
            PendingSource::Dense { name, .. } | PendingSource::Ragged { name, .. } => name,
        }
    }
}

/// Builds a container file from in-memory arrays.
#[derive(Default)]
pub struct ContainerWriter {
    sources: Vec<PendingSource>,
    splits: SplitTable,
}

impl ContainerWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if self.sources.iter().any(|s| s.name() == name) {
            return Err(StreamError::config(format!("source '{name}' added twice")));
        }
        Ok(())
    }

    /// Adds a dense source. Its first axis indexes examples.
    pub fn add_source(
        &mut self,
        name: impl Into<String>,
        array: Array,
        axis_labels: Option<Vec<String>>,
    ) -> Result<&mut Self> {
        let name = name.into();
        self.check_name(&name)?;
        if array.ndim() == 0 {
            return Err(StreamError::config(format!(
                "source '{name}' needs at least one dimension"
            )));
        }
        if let Some(labels) = &axis_labels {
            if labels.len() != array.ndim() {
                return Err(StreamError::config(format!(
                    "source '{name}' has {} dimensions but {} axis labels",
                    array.ndim(),
                    labels.len()
                )));
            }
        }
        self.sources.push(PendingSource::Dense {
            name,
            array,
            axis_labels,
        });
        Ok(self)
    }

    /// Adds a source whose rows may differ in shape. Labels name the row axis
    /// first, then every axis of a row.
    pub fn add_variable_length_source(
        &mut self,
        name: impl Into<String>,
        rows: Vec<Array>,
        axis_labels: Option<Vec<String>>,
    ) -> Result<&mut Self> {
        let name = name.into();
        self.check_name(&name)?;
        let first = rows.first().ok_or_else(|| {
            StreamError::config(format!("variable-length source '{name}' has no rows"))
        })?;
        if rows
            .iter()
            .any(|r| r.dtype() != first.dtype() || r.ndim() != first.ndim())
        {
            return Err(StreamError::config(format!(
                "rows of source '{name}' must share dtype and number of dimensions"
            )));
        }
        if let Some(labels) = &axis_labels {
            if labels.len() != first.ndim() + 1 {
                return Err(StreamError::config(format!(
                    "source '{name}' needs {} axis labels, got {}",
                    first.ndim() + 1,
                    labels.len()
                )));
            }
        }
        self.sources.push(PendingSource::Ragged {
            name,
            rows,
            axis_labels,
        });
        Ok(self)
    }

    pub fn set_splits(&mut self, splits: SplitTable) -> &mut Self {
        self.splits = splits;
        self
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut data = Vec::new();
        let mut headers = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let offset = data.len() as u64;
            match source {
                PendingSource::Dense {
                    name,
                    array,
                    axis_labels,
                } => {
                    data.extend(array.to_le_bytes());
                    headers.push(SourceHeader {
                        name: name.clone(),
                        dtype: array.dtype(),
                        shape: array.shape().to_vec(),
                        offset,
                        byte_len: data.len() as u64 - offset,
                        axis_labels: axis_labels.clone(),
                        shapes: None,
                    });
                }
                PendingSource::Ragged {
                    name,
                    rows,
                    axis_labels,
                } => {
                    for row in rows {
                        data.extend(row.to_le_bytes());
                    }
                    let byte_len = data.len() as u64 - offset;
                    let sidecar_offset = data.len() as u64;
                    for row in rows {
                        for &dim in row.shape() {
                            data.extend((dim as u64).to_le_bytes());
                        }
                    }
                    let (row_label, shape_labels) = match axis_labels {
                        Some(labels) => (
                            Some(labels[..1].to_vec()),
                            Some(labels[1..].to_vec()),
                        ),
                        None => (None, None),
                    };
                    headers.push(SourceHeader {
                        name: name.clone(),
                        dtype: rows[0].dtype(),
                        shape: vec![rows.len()],
                        offset,
                        byte_len,
                        axis_labels: row_label,
                        shapes: Some(ShapesSidecar {
                            ndim: rows[0].ndim(),
                            offset: sidecar_offset,
                            labels: shape_labels,
                        }),
                    });
                }
            }
        }

        let header = ContainerHeader {
            sources: headers,
            splits: self.splits.clone(),
        };
        let encoded = postcard::to_stdvec(&header)
            .map_err(|e| format_error(path, format!("unencodable header: {e}")))?;

        let mut out = BufWriter::new(File::create(path)?);
        out.write_all(MAGIC)?;
        out.write_all(&VERSION.to_le_bytes())?;
        out.write_all(&(encoded.len() as u64).to_le_bytes())?;
        out.write_all(&encoded)?;
        out.write_all(&data)?;
        out.flush()?;

        info!(
            path = %path.display(),
            sources = self.sources.len(),
            bytes = PREAMBLE_LEN + encoded.len() + data.len(),
            "wrote container"
        );
        Ok(())
    }
}
