//! Process-wide table of open container files, shared by every dataset that
//! reads the same path and released when the last one lets go.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use lazy_static::lazy_static;
use tracing::{debug, trace};

use crate::{error::Result, storage::ContainerFile};

lazy_static! {
    static ref HANDLES: Mutex<HashMap<PathBuf, (Arc<ContainerFile>, usize)>> =
        Mutex::new(HashMap::new());
}

fn handles() -> MutexGuard<'static, HashMap<PathBuf, (Arc<ContainerFile>, usize)>> {
    // a panic while holding the lock cannot leave a half-updated entry
    HANDLES.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn acquire(path: &Path) -> Result<Arc<ContainerFile>> {
    let mut handles = handles();
    if let Some((file, count)) = handles.get_mut(path) {
        *count += 1;
        trace!(path = %path.display(), count = *count, "reusing open container");
        return Ok(file.clone());
    }
    let file = Arc::new(ContainerFile::open(path)?);
    handles.insert(path.to_path_buf(), (file.clone(), 1));
    Ok(file)
}

pub(crate) fn release(path: &Path) {
    let mut handles = handles();
    let Some((_, count)) = handles.get_mut(path) else {
        return;
    };
    *count -= 1;
    if *count == 0 {
        handles.remove(path);
        debug!(path = %path.display(), "closed container");
    }
}

/// How many datasets currently hold `path` open.
pub fn open_handles(path: &Path) -> usize {
    handles().get(path).map_or(0, |(_, count)| *count)
}
