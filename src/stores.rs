//
// stores.rs
// dicom-deident
//
// Collaborator interfaces for the object, configuration and audit stores, plus in-memory implementations.
//

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::AuditRecord;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Raw object bytes addressed by bucket and key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>>;

    /// Durable write; returns only once the bytes are stored.
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> StoreResult<()>;
}

/// Named configuration blobs (a parameter store).
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, name: &str) -> StoreResult<Vec<u8>>;
}

/// Table-oriented store for audit records, keyed by `AuditRecord::audit_key`.
#[async_trait]
pub trait AuditBackend: Send + Sync {
    /// Create the table; fails with [`StoreError::AlreadyExists`] if it is already there.
    async fn create_table(&self, table: &str) -> StoreResult<()>;

    /// Unconditional append. Duplicate keys are kept.
    async fn put_record(&self, table: &str, record: &AuditRecord) -> StoreResult<()>;

    /// Append only when no record with the same key exists. Returns whether it was written.
    async fn put_record_if_absent(&self, table: &str, record: &AuditRecord) -> StoreResult<bool>;
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bucket: &str, key: &str, bytes: Vec<u8>) {
        lock(&self.objects).insert((bucket.to_string(), key.to_string()), bytes);
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        lock(&self.objects)
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.objects).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>> {
        self.object(bucket, key)
            .ok_or_else(|| StoreError::NotFound(format!("{bucket}/{key}")))
    }

    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> StoreResult<()> {
        self.insert(bucket, key, bytes);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryConfigStore {
    params: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_param(self, name: &str, value: impl Into<Vec<u8>>) -> Self {
        lock(&self.params).insert(name.to_string(), value.into());
        self
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self, name: &str) -> StoreResult<Vec<u8>> {
        lock(&self.params)
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }
}

#[derive(Default)]
pub struct MemoryAuditBackend {
    tables: Mutex<HashMap<String, Vec<AuditRecord>>>,
}

impl MemoryAuditBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table_count(&self) -> usize {
        lock(&self.tables).len()
    }

    /// Snapshot of a table's records in write order; `None` if the table was never created.
    pub fn records(&self, table: &str) -> Option<Vec<AuditRecord>> {
        lock(&self.tables).get(table).cloned()
    }
}

#[async_trait]
impl AuditBackend for MemoryAuditBackend {
    async fn create_table(&self, table: &str) -> StoreResult<()> {
        let mut tables = lock(&self.tables);
        if tables.contains_key(table) {
            return Err(StoreError::AlreadyExists(table.to_string()));
        }
        tables.insert(table.to_string(), Vec::new());
        Ok(())
    }

    async fn put_record(&self, table: &str, record: &AuditRecord) -> StoreResult<()> {
        let mut tables = lock(&self.tables);
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::NotFound(table.to_string()))?;
        rows.push(record.clone());
        Ok(())
    }

    async fn put_record_if_absent(&self, table: &str, record: &AuditRecord) -> StoreResult<bool> {
        let mut tables = lock(&self.tables);
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::NotFound(table.to_string()))?;
        if rows.iter().any(|row| row.audit_key == record.audit_key) {
            return Ok(false);
        }
        rows.push(record.clone());
        Ok(true)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // A poisoned map is still structurally valid; every write is a single insert/push.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
