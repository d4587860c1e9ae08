use std::{collections::BTreeSet, ops::Range};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamError};

/// One row of the split table: which rows of `source` belong to `split`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitRecord {
    pub split: String,
    pub source: String,
    pub start: i64,
    pub stop: i64,
    pub available: bool,
    pub comment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitTable {
    records: Vec<SplitRecord>,
}

/// Ordered `split -> source -> (range, comment)` description used to build a
/// [`SplitTable`].
#[derive(Debug, Clone, Default)]
pub struct SplitDict {
    splits: Vec<(String, Vec<(String, Range<usize>, String)>)>,
}

impl SplitDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(self, split: &str, source: &str, rows: Range<usize>) -> Self {
        self.add_with_comment(split, source, rows, "")
    }

    pub fn add_with_comment(
        mut self,
        split: &str,
        source: &str,
        rows: Range<usize>,
        comment: &str,
    ) -> Self {
        let entry = (source.to_owned(), rows, comment.to_owned());
        match self.splits.iter_mut().find(|(name, _)| name == split) {
            Some((_, sources)) => sources.push(entry),
            None => self.splits.push((split.to_owned(), vec![entry])),
        }
        self
    }
}

impl SplitTable {
    pub fn new(records: Vec<SplitRecord>) -> Self {
        Self { records }
    }

    /// One record for every (split, source) pair, sources sorted by name.
    /// Pairs missing from `dict` are recorded as unavailable.
    pub fn from_split_dict(dict: &SplitDict) -> Self {
        let sources: BTreeSet<&str> = dict
            .splits
            .iter()
            .flat_map(|(_, sources)| sources.iter().map(|(source, _, _)| source.as_str()))
            .collect();

        let mut records = Vec::with_capacity(dict.splits.len() * sources.len());
        for (split, entries) in &dict.splits {
            for source in &sources {
                let record = match entries.iter().find(|(name, _, _)| name == source) {
                    Some((_, rows, comment)) => SplitRecord {
                        split: split.clone(),
                        source: source.to_string(),
                        start: rows.start as i64,
                        stop: rows.end as i64,
                        available: true,
                        comment: comment.clone(),
                    },
                    None => SplitRecord {
                        split: split.clone(),
                        source: source.to_string(),
                        start: 0,
                        stop: 0,
                        available: false,
                        comment: String::new(),
                    },
                };
                records.push(record);
            }
        }
        Self { records }
    }

    pub fn records(&self) -> &[SplitRecord] {
        &self.records
    }

    fn available(&self) -> impl Iterator<Item = &SplitRecord> {
        self.records.iter().filter(|r| r.available)
    }

    /// Splits with at least one available source, in table order.
    pub fn splits(&self) -> Vec<&str> {
        let mut splits: Vec<&str> = Vec::new();
        for record in self.available() {
            if !splits.contains(&record.split.as_str()) {
                splits.push(&record.split);
            }
        }
        splits
    }

    pub fn sources_of(&self, split: &str) -> Vec<&str> {
        self.available()
            .filter(|r| r.split == split)
            .map(|r| r.source.as_str())
            .collect()
    }

    fn record(&self, split: &str, source: &str) -> Option<&SplitRecord> {
        self.available()
            .find(|r| r.split == split && r.source == source)
    }

    pub fn comment(&self, split: &str, source: &str) -> Option<&str> {
        self.record(split, source).map(|r| r.comment.as_str())
    }

    pub fn range(&self, split: &str, source: &str) -> Result<Range<usize>> {
        let record = self.record(split, source).ok_or_else(|| {
            StreamError::config(format!(
                "split '{split}' has no available data for source '{source}'"
            ))
        })?;
        match (usize::try_from(record.start), usize::try_from(record.stop)) {
            (Ok(start), Ok(stop)) if start <= stop => Ok(start..stop),
            _ => Err(StreamError::config(format!(
                "split '{split}' has an invalid range {}..{} for source '{source}'",
                record.start, record.stop
            ))),
        }
    }

    /// Number of examples in `split`. Every available source has to cover
    /// the same number of rows.
    pub fn num_examples(&self, split: &str) -> Result<usize> {
        let mut num_examples = None;
        for source in self.sources_of(split) {
            let len = self.range(split, source)?.len();
            match num_examples {
                None => num_examples = Some(len),
                Some(n) if n != len => {
                    return Err(StreamError::config(format!(
                        "sources of split '{split}' have different lengths \
                         ({n} and {len} for '{source}')"
                    )))
                }
                Some(_) => {}
            }
        }
        num_examples.ok_or_else(|| {
            StreamError::config(format!("split '{split}' has no available sources"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SplitTable {
        SplitTable::from_split_dict(
            &SplitDict::new()
                .add("train", "features", 0..8)
                .add("train", "targets", 0..8)
                .add_with_comment("test", "features", 8..10, "no labels"),
        )
    }

    #[test]
    fn missing_pairs_are_unavailable() {
        let table = table();
        assert_eq!(table.records().len(), 4);
        assert_eq!(table.splits(), vec!["train", "test"]);
        assert_eq!(table.sources_of("test"), vec!["features"]);
        assert_eq!(table.comment("test", "features"), Some("no labels"));
        let unavailable = table
            .records()
            .iter()
            .find(|r| r.split == "test" && r.source == "targets")
            .unwrap();
        assert!(!unavailable.available);
        assert!(table.range("test", "targets").is_err());
    }

    #[test]
    fn num_examples_requires_equal_lengths() {
        assert_eq!(table().num_examples("train").unwrap(), 8);
        let uneven = SplitTable::from_split_dict(
            &SplitDict::new()
                .add("train", "features", 0..8)
                .add("train", "targets", 0..7),
        );
        let err = uneven.num_examples("train").unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn negative_ranges_are_rejected() {
        let table = SplitTable::new(vec![SplitRecord {
            split: "train".into(),
            source: "x".into(),
            start: -1,
            stop: 3,
            available: true,
            comment: String::new(),
        }]);
        assert!(table.range("train", "x").is_err());
    }
}
