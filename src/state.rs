use std::{path::PathBuf, sync::Arc};

/// Shared request state: the ordered probe directories for data files.
/// There is no mutable state; every request re-reads from disk.
#[derive(Clone)]
pub struct AppState {
    pub search_dirs: Arc<Vec<PathBuf>>,
}

impl AppState {
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self {
            search_dirs: Arc::new(search_dirs),
        }
    }
}
