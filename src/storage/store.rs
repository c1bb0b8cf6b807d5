//! Atomic units over the shared tables, persisted row by row in sled.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use sled::{Batch, Db, Tree};
use thiserror::Error;

use crate::storage::Tables;

const STATE_TREE: &str = "custody_state";

/// Errors raised while loading or persisting state.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Stored row is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

struct Backend {
    db: Db,
    state: Tree,
    path: PathBuf,
}

/// Shared handle to the custody state.
///
/// Cloning is cheap; all clones see the same tables. Every mutation runs
/// through [`Store::atomic`], which is the transaction boundary of the
/// system. Each committed unit writes exactly the rows it touched as one
/// sled batch.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Mutex<Tables>>,
    backend: Option<Arc<Backend>>,
}

impl Store {
    /// A store that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Tables::new())),
            backend: None,
        }
    }

    /// Open (or create) the database directory at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let db = sled::open(&path)?;
        let state = db.open_tree(STATE_TREE)?;

        let mut tables = Tables::new();
        for row in state.iter() {
            let (key, value) = row?;
            tables.load_row(&key, &value)?;
        }
        tables.rebuild_indexes();
        tracing::info!(
            path = %path.display(),
            operations = tables.operations.len(),
            accounts = tables.accounts.len(),
            "Loaded custody state"
        );

        Ok(Self {
            inner: Arc::new(Mutex::new(tables)),
            backend: Some(Arc::new(Backend { db, state, path })),
        })
    }

    /// Run `f` as one atomic unit.
    ///
    /// On `Ok` the rows the closure touched are written in a single batch
    /// and flushed before the lock is released. On `Err`, or if the write
    /// fails, every touched row is restored.
    pub fn atomic<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Tables) -> Result<T, E>,
        E: From<StorageError>,
    {
        let mut guard = self.inner.lock();
        let value = match f(&mut *guard) {
            Ok(value) => value,
            Err(e) => {
                guard.rollback();
                return Err(e);
            }
        };
        if let Some(backend) = &self.backend {
            if let Err(e) = persist(backend, &mut *guard) {
                tracing::error!(error = %e, "Failed to persist atomic unit, rolling back");
                guard.rollback();
                return Err(e.into());
            }
        }
        guard.settle();
        Ok(value)
    }

    /// Read a consistent view of the tables.
    pub fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        let guard = self.inner.lock();
        f(&guard)
    }

    /// Flush sled's buffers to disk (no-op for in-memory stores).
    pub fn flush(&self) -> Result<(), StorageError> {
        if let Some(backend) = &self.backend {
            let bytes = backend.db.flush()?;
            tracing::info!(path = %backend.path.display(), bytes, "Custody state flushed");
        }
        Ok(())
    }
}

fn persist(backend: &Backend, tables: &mut Tables) -> Result<(), StorageError> {
    if !tables.is_dirty() {
        return Ok(());
    }
    let mut batch = Batch::default();
    for (key, value) in tables.pending_changes()? {
        match value {
            Some(bytes) => batch.insert(key, bytes),
            None => batch.remove(key),
        }
    }
    backend.state.apply_batch(batch)?;
    backend.db.flush()?;
    Ok(())
}
