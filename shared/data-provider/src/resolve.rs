use std::path::{Path, PathBuf};

use tracing::debug;

use crate::Config;

/// Maps a logical dataset path to the path that is actually opened, e.g. a
/// locally cached copy. Called once per dataset construction.
pub trait PathResolver: Send + Sync {
    fn resolve(&self, path: &Path) -> PathBuf;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Identity;

impl PathResolver for Identity {
    fn resolve(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }
}

impl<F> PathResolver for F
where
    F: Fn(&Path) -> PathBuf + Send + Sync,
{
    fn resolve(&self, path: &Path) -> PathBuf {
        self(path)
    }
}

/// Looks relative file names up in the configured data directories, first
/// match wins. Absolute or unmatched paths are returned unchanged.
#[derive(Debug, Clone, Default)]
pub struct DataPathResolver {
    data_path: Vec<PathBuf>,
}

impl DataPathResolver {
    pub fn new(data_path: Vec<PathBuf>) -> Self {
        Self { data_path }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.data_path.clone())
    }
}

impl PathResolver for DataPathResolver {
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match self
            .data_path
            .iter()
            .map(|dir| dir.join(path))
            .find(|candidate| candidate.is_file())
        {
            Some(found) => {
                debug!(from = %path.display(), to = %found.display(), "resolved dataset path");
                found
            }
            None => path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_files_in_data_path() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(second.path().join("mnist.slc"), b"").unwrap();

        let resolver = DataPathResolver::new(vec![
            first.path().to_path_buf(),
            second.path().to_path_buf(),
        ]);
        assert_eq!(
            resolver.resolve(Path::new("mnist.slc")),
            second.path().join("mnist.slc")
        );
        assert_eq!(
            resolver.resolve(Path::new("missing.slc")),
            PathBuf::from("missing.slc")
        );
    }

    #[test]
    fn closures_are_resolvers() {
        let resolver = |p: &Path| Path::new("/cache").join(p);
        assert_eq!(
            resolver.resolve(Path::new("a.slc")),
            PathBuf::from("/cache/a.slc")
        );
        assert_eq!(Identity.resolve(Path::new("b")), PathBuf::from("b"));
    }
}
