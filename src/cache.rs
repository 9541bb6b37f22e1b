use crate::error::ParseError;
use crate::parser::{self, ParsedTable};
use crate::record::Record;
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// An immutable set of records together with the time it was loaded.
#[derive(Debug)]
pub struct CacheSnapshot {
    pub headers: Vec<String>,
    pub records: Vec<Record>,
    pub loaded_at: DateTime<Utc>,
}

impl CacheSnapshot {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Result of a [`CacheStore::load`] that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The file was parsed and the snapshot replaced.
    Loaded { records: usize },
    /// The data file does not exist; the current snapshot (if any) is untouched.
    NoData,
}

/// Holds the most recently parsed snapshot of the data file.
///
/// The slot is swapped wholesale on every successful load, so a reader that
/// cloned the `Arc` keeps a consistent view even while a reload happens.
pub struct CacheStore {
    path: PathBuf,
    slot: RwLock<Option<Arc<CacheSnapshot>>>,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CacheStore {
            path: path.into(),
            slot: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data_file_exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read and parse the data file, replacing the snapshot on success.
    ///
    /// A missing file yields `LoadOutcome::NoData` and leaves the cache as it
    /// was. A parse failure is returned and also leaves the cache as it was.
    pub async fn load(&self) -> Result<LoadOutcome, ParseError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("data file not found at {}", self.path.display());
                return Ok(LoadOutcome::NoData);
            }
            Err(e) => return Err(ParseError::Io(e)),
        };

        let ParsedTable { headers, records } = parser::parse_bytes(&bytes)?;
        let count = records.len();
        let snapshot = Arc::new(CacheSnapshot {
            headers,
            records,
            loaded_at: Utc::now(),
        });

        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
        info!("loaded {} records into cache from {}", count, self.path.display());
        Ok(LoadOutcome::Loaded { records: count })
    }

    /// The current snapshot, or `None` if nothing has been loaded yet.
    pub fn get(&self) -> Option<Arc<CacheSnapshot>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drop the current snapshot.
    pub fn clear(&self) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn record_count(&self) -> usize {
        self.get().map(|s| s.len()).unwrap_or(0)
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.get().map(|s| s.loaded_at)
    }
}
