//! Process-wide cache of the shared function library.
//!
//! The library is a block of Rhai function definitions appended to every
//! script. It is read from disk once; after that, changes to the file have no
//! effect for the lifetime of the process. A failed first read is cached as
//! well, so every later execution fails the same way instead of retrying.

use once_cell::sync::{Lazy, OnceCell};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{error, info};

use crate::error::{AppResult, MetaError};

static GLOBAL: Lazy<Arc<FunctionLibrary>> = Lazy::new(|| Arc::new(FunctionLibrary::new()));

/// Write-once holder of the function library text.
#[derive(Debug, Default)]
pub struct FunctionLibrary {
    text: OnceCell<Result<Arc<str>, String>>,
    reads: AtomicUsize,
}

impl FunctionLibrary {
    /// An empty, not yet loaded library.
    pub fn new() -> Self {
        Self::default()
    }

    /// A library whose text is already known.
    pub fn from_source(source: impl Into<Arc<str>>) -> Self {
        let library = Self::new();
        // A fresh cell cannot already be set.
        let _ = library.text.set(Ok(source.into()));
        library
    }

    /// The library shared by every executor in the process.
    pub fn global() -> Arc<FunctionLibrary> {
        GLOBAL.clone()
    }

    /// Return the library text, reading it from `path` on first use.
    ///
    /// Concurrent first callers block until the single read completes and
    /// all observe its result. `path` is ignored once the library is loaded.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Internal`] if the first read failed.
    pub fn ensure_loaded(&self, path: &Path) -> AppResult<Arc<str>> {
        let loaded = self.text.get_or_init(|| {
            self.reads.fetch_add(1, Ordering::SeqCst);
            match std::fs::read_to_string(path) {
                Ok(text) => {
                    info!(path = %path.display(), bytes = text.len(), "Loaded script function library");
                    Ok(Arc::from(text))
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to load script function library");
                    Err(format!(
                        "Failed to read function library {}: {}",
                        path.display(),
                        e
                    ))
                }
            }
        });

        match loaded {
            Ok(text) => Ok(text.clone()),
            Err(message) => Err(MetaError::Internal(message.clone())),
        }
    }

    /// Whether a load has been attempted and succeeded.
    pub fn is_loaded(&self) -> bool {
        matches!(self.text.get(), Some(Ok(_)))
    }

    /// Number of times the backing file was read.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}
