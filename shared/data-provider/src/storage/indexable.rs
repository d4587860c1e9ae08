use sluice_core::SourceData;

use crate::{
    error::{Result, StreamError},
    request::Request,
    storage::{check_request, Dataset},
    AxisLabels, Data,
};

/// A dataset over arrays that are already in memory, one per source, each
/// indexed along its first axis.
#[derive(Debug, Clone)]
pub struct IndexableDataset {
    sources: Vec<String>,
    columns: Vec<SourceData>,
    axis_labels: Option<AxisLabels>,
    num_examples: usize,
}

impl IndexableDataset {
    pub fn new<S: Into<String>>(
        columns: impl IntoIterator<Item = (S, SourceData)>,
    ) -> Result<Self> {
        let (sources, columns): (Vec<String>, Vec<SourceData>) = columns
            .into_iter()
            .map(|(name, data)| (name.into(), data))
            .unzip();
        let num_examples = columns
            .first()
            .map(SourceData::len)
            .ok_or_else(|| StreamError::config("an indexable dataset needs at least one source"))?;
        for (index, name) in sources.iter().enumerate() {
            if sources[..index].contains(name) {
                return Err(StreamError::config(format!("source '{name}' given twice")));
            }
            if columns[index].len() != num_examples {
                return Err(StreamError::config(format!(
                    "source '{name}' has {} examples, expected {num_examples}",
                    columns[index].len()
                )));
            }
        }
        Ok(Self {
            sources,
            columns,
            axis_labels: None,
            num_examples,
        })
    }

    pub fn with_axis_labels(mut self, axis_labels: AxisLabels) -> Self {
        self.axis_labels = (!axis_labels.is_empty()).then_some(axis_labels);
        self
    }
}

impl Dataset for IndexableDataset {
    fn sources(&self) -> &[String] {
        &self.sources
    }

    fn axis_labels(&self) -> Option<&AxisLabels> {
        self.axis_labels.as_ref()
    }

    fn num_examples(&self) -> usize {
        self.num_examples
    }

    fn get_data(&self, request: &Request) -> Result<Data> {
        check_request(request, self.num_examples)?;
        self.columns
            .iter()
            .map(|column| {
                Ok(match request {
                    Request::Index(i) => SourceData::Array(column.example(*i)?),
                    Request::Indices(indices) => column.select(indices)?,
                    Request::Slice(rows) => column.slice(rows.clone())?,
                    Request::Size(_) => {
                        return Err(StreamError::invalid_request(
                            "datasets cannot serve batch-size requests",
                        ))
                    }
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use sluice_core::Array;

    use super::*;

    fn dataset() -> IndexableDataset {
        IndexableDataset::new([
            ("features", SourceData::Array(Array::from_vec(vec![10i64, 20, 30, 40, 50]))),
            ("targets", SourceData::Array(Array::from_vec(vec![0u8, 1, 0, 1, 0]))),
        ])
        .unwrap()
    }

    #[test]
    fn serves_every_request_shape() {
        let dataset = dataset();
        let example = dataset.get_data(&Request::Index(2)).unwrap();
        assert_eq!(example[0], SourceData::Array(Array::scalar(30i64)));

        let batch = dataset.get_data(&Request::Indices(vec![4, 1, 3])).unwrap();
        assert_eq!(
            batch[0].as_array().unwrap().to_vec::<i64>().unwrap(),
            vec![50, 20, 40]
        );

        let slice = dataset.get_data(&Request::Slice(1..3)).unwrap();
        assert_eq!(slice[1].as_array().unwrap().to_vec::<u8>().unwrap(), vec![1, 0]);
    }

    #[test]
    fn rejects_bad_requests() {
        let dataset = dataset();
        assert!(matches!(
            dataset.get_data(&Request::Index(5)),
            Err(StreamError::InvalidRequest(_))
        ));
        assert!(matches!(
            dataset.get_data(&Request::Size(2)),
            Err(StreamError::InvalidRequest(_))
        ));
    }

    #[test]
    fn sources_must_have_equal_length() {
        let err = IndexableDataset::new([
            ("a", SourceData::Array(Array::from_vec(vec![1i32, 2]))),
            ("b", SourceData::Array(Array::from_vec(vec![1i32]))),
        ])
        .unwrap_err();
        assert!(err.is_config());
    }
}
