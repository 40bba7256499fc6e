//! Persistence sinks: where successful scan results end up.
//!
//! The engine only needs an idempotent upsert keyed by address. Each worker
//! opens its own [`Sink`] through a [`SinkConnector`] and closes it once all
//! of its tasks have finished, so sink handles are never shared between
//! workers.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;

use crate::address::Address;
use crate::errors::SinkError;

/// A persisted scan result. `key` is the address in dotted-quad form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub latency: u64,
    pub data: Value,
    pub scanned_at: DateTime<Utc>,
}

impl Record {
    pub fn new(target: Address, latency: u64, data: Value) -> Self {
        Self {
            key: target.to_string(),
            latency,
            data,
            scanned_at: Utc::now(),
        }
    }
}

/// Opens one sink handle per worker. `collection` is the scanner name.
#[async_trait]
pub trait SinkConnector: Send + Sync {
    async fn connect(&self, collection: &str) -> Result<Box<dyn Sink>, SinkError>;
}

/// A per-worker handle that can be shared by that worker's tasks.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Inserts the record or replaces the one stored under the same key.
    async fn upsert(&self, record: &Record) -> Result<(), SinkError>;

    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Stores each record as `<root>/<collection>/<key>.json`.
///
/// Documents are written to a temporary file and renamed into place, so a
/// reader never observes a half-written record and the last write wins.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn collection_dir(&self, collection: &str) -> PathBuf {
        self.root.join(collection)
    }
}

#[async_trait]
impl SinkConnector for FileStore {
    async fn connect(&self, collection: &str) -> Result<Box<dyn Sink>, SinkError> {
        let dir = self.collection_dir(collection);
        fs::create_dir_all(&dir).await?;
        Ok(Box::new(FileSink { dir }))
    }
}

/// Temp file suffixes, unique across every handle in the process.
static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    fn document_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        let n = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(".{key}.{}.{n}.tmp", std::process::id()))
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn upsert(&self, record: &Record) -> Result<(), SinkError> {
        let body = serde_json::to_vec_pretty(record)?;
        let tmp = self.temp_path(&record.key);
        fs::write(&tmp, body).await?;
        if let Err(e) = fs::rename(&tmp, self.document_path(&record.key)).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

/// Reads a stored document back, mainly for inspection and tests.
pub async fn read_record(dir: &Path, key: &str) -> Result<Record, SinkError> {
    let body = fs::read(dir.join(format!("{key}.json"))).await?;
    Ok(serde_json::from_slice(&body)?)
}

type Collections = HashMap<String, HashMap<String, Record>>;

/// In-process sink keeping every collection in memory.
///
/// Also counts opened and closed handles, which makes per-worker sink
/// ownership observable.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<Collections>>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, collection: &str, key: &str) -> Option<Record> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.get(collection)?.get(key).cloned()
    }

    pub fn len(&self, collection: &str) -> usize {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.get(collection).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SinkConnector for MemoryStore {
    async fn connect(&self, collection: &str) -> Result<Box<dyn Sink>, SinkError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySink {
            collection: collection.to_owned(),
            store: self.clone(),
        }))
    }
}

#[derive(Debug)]
struct MemorySink {
    collection: String,
    store: MemoryStore,
}

#[async_trait]
impl Sink for MemorySink {
    async fn upsert(&self, record: &Record) -> Result<(), SinkError> {
        let mut records = self
            .store
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        records
            .entry(self.collection.clone())
            .or_default()
            .insert(record.key.clone(), record.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.store.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
