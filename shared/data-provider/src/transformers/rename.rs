use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    error::{Kind, Result, StreamError},
    stream::DataStream,
    transformers::{check_known_sources, Pipe, Transform},
    Data,
};

/// What [`Rename`] does with a name that is not one of the stream's sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnNonExistent {
    #[default]
    Raise,
    Ignore,
    Warn,
}

/// Renames sources. Data passes through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rename;

impl Rename {
    pub fn new<S: DataStream>(
        stream: S,
        names: BTreeMap<String, String>,
        on_non_existent: OnNonExistent,
    ) -> Result<Pipe<S, Rename>> {
        let sources = stream.sources();
        let usable: Vec<(&String, &String)> = names
            .iter()
            .filter(|(old, _)| sources.contains(*old))
            .collect();
        let targets: HashSet<&String> = usable.iter().map(|(_, new)| *new).collect();
        if targets.len() != usable.len() {
            return Err(StreamError::config(
                "multiple old source names cannot map to the same new source name",
            ));
        }

        let mut renamed = sources.to_vec();
        for (old, new) in &names {
            if sources.contains(new) && !names.contains_key(new) && sources.contains(old) {
                return Err(StreamError::config(format!(
                    "renaming source '{old}' to '{new}' would create two sources named '{new}'"
                )));
            }
            match sources.iter().position(|source| source == old) {
                Some(index) => renamed[index] = new.clone(),
                None => {
                    let message = format!(
                        "cannot rename '{old}': the data stream only has sources {sources:?}"
                    );
                    match on_non_existent {
                        OnNonExistent::Raise => return Err(StreamError::config(message)),
                        OnNonExistent::Warn => warn!("{message}"),
                        OnNonExistent::Ignore => debug!("{message}"),
                    }
                }
            }
        }

        let axis_labels = stream.axis_labels().map(|labels| {
            labels
                .iter()
                .map(|(source, labels)| {
                    let source = names.get(source).unwrap_or(source);
                    (source.clone(), labels.clone())
                })
                .collect()
        });
        Ok(Pipe::new(stream, Rename)
            .with_sources(renamed)
            .with_axis_labels(axis_labels))
    }
}

impl Transform for Rename {
    fn transform_any(&mut self, data: Data, _kind: Kind) -> Result<Data> {
        Ok(data)
    }
}

/// Keeps only some sources, in the order the stream has them.
#[derive(Debug, Clone)]
pub struct FilterSources {
    keep: Vec<bool>,
}

impl FilterSources {
    pub fn new<S: DataStream>(stream: S, sources: &[String]) -> Result<Pipe<S, FilterSources>> {
        check_known_sources(sources, stream.sources())?;
        let keep: Vec<bool> = stream
            .sources()
            .iter()
            .map(|source| sources.contains(source))
            .collect();
        let kept: Vec<String> = stream
            .sources()
            .iter()
            .filter(|source| sources.contains(*source))
            .cloned()
            .collect();
        let axis_labels = stream.axis_labels().map(|labels| {
            labels
                .iter()
                .filter(|(source, _)| kept.contains(*source))
                .map(|(source, labels)| (source.clone(), labels.clone()))
                .collect()
        });
        Ok(Pipe::new(stream, FilterSources { keep })
            .with_sources(kept)
            .with_axis_labels(axis_labels))
    }
}

impl Transform for FilterSources {
    fn transform_any(&mut self, data: Data, _kind: Kind) -> Result<Data> {
        Ok(data
            .into_iter()
            .zip(&self.keep)
            .filter_map(|(value, &keep)| keep.then_some(value))
            .collect())
    }
}
