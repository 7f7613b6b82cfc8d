//! Backing stores for permission records.
//!
//! Provides a trait-based abstraction over string-keyed, string-valued
//! persistence partitioned by context, with two implementations:
//! - `JsonFileBackend`: one JSON file per context on disk.
//! - `InMemoryBackend`: process-local storage for tests and ephemeral hosts.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::context::ContextId;
use crate::error::StoreError;
use crate::persistence::{atomic_write_json, load_json};

/// File name of a context's partition under the backend root.
pub const PARTITION_FILE: &str = "user_permissions.json";

/// Key-value persistence with one partition per context.
///
/// `write` and `remove` may be buffered until `flush` is called for the
/// same context.
#[async_trait]
pub trait PermissionBackend: Send + Sync {
    /// Read the stored value for `key`, if any.
    async fn read(&self, context: &ContextId, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`.
    async fn write(&self, context: &ContextId, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete `key`. Deleting a missing key is not an error.
    async fn remove(&self, context: &ContextId, key: &str) -> Result<(), StoreError>;

    /// Make every buffered change for `context` durable.
    async fn flush(&self, context: &ContextId) -> Result<(), StoreError>;
}

/// In-memory backend. Nothing survives the process.
#[derive(Default)]
pub struct InMemoryBackend {
    partitions: Mutex<HashMap<ContextId, BTreeMap<String, String>>>,
    flushes: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything stored for `context`.
    pub async fn snapshot(&self, context: &ContextId) -> BTreeMap<String, String> {
        self.partitions
            .lock()
            .await
            .get(context)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of `flush` calls received so far.
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionBackend for InMemoryBackend {
    async fn read(&self, context: &ContextId, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .partitions
            .lock()
            .await
            .get(context)
            .and_then(|p| p.get(key).cloned()))
    }

    async fn write(&self, context: &ContextId, key: &str, value: &str) -> Result<(), StoreError> {
        self.partitions
            .lock()
            .await
            .entry(context.clone())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, context: &ContextId, key: &str) -> Result<(), StoreError> {
        if let Some(partition) = self.partitions.lock().await.get_mut(context) {
            partition.remove(key);
        }
        Ok(())
    }

    async fn flush(&self, _context: &ContextId) -> Result<(), StoreError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct FilePartition {
    records: BTreeMap<String, String>,
    loaded: bool,
    dirty: bool,
}

/// Stores each context as `<root>/<encoded context>/user_permissions.json`.
///
/// A partition is loaded from disk on first access and kept in memory;
/// changes are written back atomically on `flush`. Disk access runs on the
/// blocking thread pool.
pub struct JsonFileBackend {
    root: PathBuf,
    partitions: RwLock<HashMap<ContextId, Arc<Mutex<FilePartition>>>>,
}

impl JsonFileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            partitions: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the partition for `context` lives on disk. Distinct context ids
    /// always map to distinct directories.
    pub fn partition_path(&self, context: &ContextId) -> PathBuf {
        self.root
            .join(encode_component(context.as_str()))
            .join(PARTITION_FILE)
    }

    async fn partition(&self, context: &ContextId) -> Arc<Mutex<FilePartition>> {
        if let Some(p) = self.partitions.read().await.get(context) {
            return p.clone();
        }
        self.partitions
            .write()
            .await
            .entry(context.clone())
            .or_default()
            .clone()
    }

    async fn ensure_loaded(
        &self,
        context: &ContextId,
        partition: &mut FilePartition,
    ) -> Result<(), StoreError> {
        if partition.loaded {
            return Ok(());
        }
        let path = self.partition_path(context);
        let path_clone = path.clone();
        let records: Option<BTreeMap<String, String>> =
            blocking_io(context, &path, move || load_json(&path_clone)).await?;
        debug!(context = %context, path = %path.display(), "Loaded permission partition");
        partition.records = records.unwrap_or_default();
        partition.loaded = true;
        Ok(())
    }
}

#[async_trait]
impl PermissionBackend for JsonFileBackend {
    async fn read(&self, context: &ContextId, key: &str) -> Result<Option<String>, StoreError> {
        let partition = self.partition(context).await;
        let mut partition = partition.lock().await;
        self.ensure_loaded(context, &mut partition).await?;
        Ok(partition.records.get(key).cloned())
    }

    async fn write(&self, context: &ContextId, key: &str, value: &str) -> Result<(), StoreError> {
        let partition = self.partition(context).await;
        let mut partition = partition.lock().await;
        self.ensure_loaded(context, &mut partition).await?;
        let previous = partition
            .records
            .insert(key.to_string(), value.to_string());
        if previous.as_deref() != Some(value) {
            partition.dirty = true;
        }
        Ok(())
    }

    async fn remove(&self, context: &ContextId, key: &str) -> Result<(), StoreError> {
        let partition = self.partition(context).await;
        let mut partition = partition.lock().await;
        self.ensure_loaded(context, &mut partition).await?;
        if partition.records.remove(key).is_some() {
            partition.dirty = true;
        }
        Ok(())
    }

    async fn flush(&self, context: &ContextId) -> Result<(), StoreError> {
        let partition = self.partition(context).await;
        let mut partition = partition.lock().await;
        if !partition.dirty {
            return Ok(());
        }
        let path = self.partition_path(context);
        let path_clone = path.clone();
        let records = partition.records.clone();
        blocking_io(context, &path, move || atomic_write_json(&path_clone, &records)).await?;
        partition.dirty = false;
        debug!(
            context = %context,
            records = partition.records.len(),
            "Flushed permission partition"
        );
        Ok(())
    }
}

/// Run file I/O for `context` on the blocking pool.
async fn blocking_io<T, F>(context: &ContextId, path: &Path, op: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| StoreError::Backend {
            context: context.to_string(),
            message: format!("file task failed: {e}"),
        })?
        .map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Encode a context id as a single path component.
///
/// `[a-z0-9-]` passes through; every other byte becomes `_XX` (uppercase
/// hex), so the mapping is injective even on case-insensitive file systems.
/// The empty id maps to `_`, which no other id produces.
fn encode_component(raw: &str) -> String {
    if raw.is_empty() {
        return "_".to_string();
    }
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b'-' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("_{byte:02X}"));
        }
    }
    encoded
}
