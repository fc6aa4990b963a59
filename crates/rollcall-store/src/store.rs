//! The record store seam and its in-memory implementation.

use crate::record::{validate_key, AttendanceUpdate, StudentRecord};
use crate::StoreError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Identity-keyed student record storage.
#[async_trait]
pub trait StudentStore: Send + Sync {
    /// Fetch one record; `None` if the key does not exist.
    async fn get(&self, id: &str) -> Result<Option<StudentRecord>, StoreError>;
    /// Fetch every record, keyed by id.
    async fn list(&self) -> Result<BTreeMap<String, StudentRecord>, StoreError>;
    /// Create or overwrite the record at `record.id`.
    async fn put(&self, record: &StudentRecord) -> Result<(), StoreError>;
    /// Patch only the attendance fields of an existing record.
    async fn update_attendance(&self, id: &str, update: &AttendanceUpdate) -> Result<(), StoreError>;
    /// Remove a record. Deleting a missing key is not an error.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// Process-local store used by tests and dry runs.
///
/// Counts mutating calls so callers can assert on write volume.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, StudentRecord>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = StudentRecord>) -> Self {
        let map = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            records: Mutex::new(map),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of put/update/delete calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, StudentRecord>> {
        // A poisoned map is still consistent: every mutation is a single insert/remove.
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl StudentStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<StudentRecord>, StoreError> {
        validate_key(id)?;
        Ok(self.lock().get(id).cloned())
    }

    async fn list(&self) -> Result<BTreeMap<String, StudentRecord>, StoreError> {
        Ok(self.lock().clone())
    }

    async fn put(&self, record: &StudentRecord) -> Result<(), StoreError> {
        validate_key(&record.id)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.lock().insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update_attendance(&self, id: &str, update: &AttendanceUpdate) -> Result<(), StoreError> {
        validate_key(id)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut records = self.lock();
        let record = records
            .entry(id.to_string())
            .or_insert_with(|| StudentRecord::new(id, "", "").with_defaults(id));
        update.apply(record);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        validate_key(id)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.lock().remove(id);
        Ok(())
    }
}
