//! In-process [`RowStore`] for dry runs and tests.
//!
//! Upserts merge into the existing row the way the SQL statement does:
//! listed columns are overwritten, the rest are kept. Failures can be
//! injected per operation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use valvesize_core::codec::{ResultSet, SparseRow};
use valvesize_core::work_key::WorkKey;

use crate::store::{RowStore, StoreError};

#[derive(Default)]
pub struct MemoryRowStore {
    requests: Mutex<HashMap<WorkKey, SparseRow>>,
    results: Mutex<HashMap<WorkKey, SparseRow>>,
    fail_result_upserts: AtomicBool,
    fail_request_upserts: AtomicBool,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a request row.
    pub fn insert_request(&self, key: WorkKey, row: SparseRow) {
        lock(&self.requests).insert(key, row);
    }

    pub fn request(&self, key: &WorkKey) -> Option<SparseRow> {
        lock(&self.requests).get(key).cloned()
    }

    pub fn result(&self, key: &WorkKey) -> Option<SparseRow> {
        lock(&self.results).get(key).cloned()
    }

    pub fn result_count(&self) -> usize {
        lock(&self.results).len()
    }

    pub fn fail_result_upserts(&self, fail: bool) {
        self.fail_result_upserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_request_upserts(&self, fail: bool) {
        self.fail_request_upserts.store(fail, Ordering::SeqCst);
    }
}

/// Lock a map, recovering from a poisoned mutex.
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn merge(target: &mut HashMap<WorkKey, SparseRow>, key: &WorkKey, fields: &SparseRow) {
    let row = target.entry(key.clone()).or_default();
    for (column, value) in fields {
        row.insert(column.clone(), value.clone());
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn fetch_row(&self, key: &WorkKey) -> Result<SparseRow, StoreError> {
        Ok(self.request(key).unwrap_or_default())
    }

    async fn upsert_result(&self, key: &WorkKey, result: &ResultSet) -> Result<(), StoreError> {
        if self.fail_result_upserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("result upserts disabled".into()));
        }
        merge(&mut lock(&self.results), key, result.as_row());
        Ok(())
    }

    async fn upsert_request(&self, key: &WorkKey, fields: &SparseRow) -> Result<(), StoreError> {
        if self.fail_request_upserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("request upserts disabled".into()));
        }
        merge(&mut lock(&self.requests), key, fields);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
