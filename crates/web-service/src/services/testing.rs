//! 测试用的存储包装

use database::query::Query;
use database::{DatabaseError, DatabaseResult, FilterCondition, MemoryStore, Row, Store};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// 在 [`MemoryStore`] 外面记录插入次数，并且可以让更新失败
///
/// 克隆出来的句柄共享计数和开关。
#[derive(Debug, Clone)]
pub struct RecordingStore {
    inner: MemoryStore,
    inserts: Arc<AtomicUsize>,
    fail_updates: Arc<AtomicBool>,
}

impl RecordingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            inserts: Arc::default(),
            fail_updates: Arc::default(),
        }
    }

    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn fail_updates(&self) {
        self.fail_updates.store(true, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Store for RecordingStore {
    async fn select(&mut self, query: &Query) -> DatabaseResult<Vec<Row>> {
        self.inner.select(query).await
    }

    async fn count(&mut self, table: &str, filters: &[FilterCondition]) -> DatabaseResult<u64> {
        self.inner.count(table, filters).await
    }

    async fn insert(&mut self, table: &str, row: Row) -> DatabaseResult<Row> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(table, row).await
    }

    async fn insert_many(&mut self, table: &str, rows: Vec<Row>) -> DatabaseResult<u64> {
        self.inserts.fetch_add(rows.len(), Ordering::SeqCst);
        self.inner.insert_many(table, rows).await
    }

    async fn update(&mut self, table: &str, key_column: &str, key: &Value, changes: Row) -> DatabaseResult<Option<Row>> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(DatabaseError::connection("connection reset"));
        }
        self.inner.update(table, key_column, key, changes).await
    }

    async fn delete(&mut self, table: &str, key_column: &str, key: &Value) -> DatabaseResult<u64> {
        self.inner.delete(table, key_column, key).await
    }

    async fn has_column(&mut self, table: &str, column: &str) -> DatabaseResult<bool> {
        self.inner.has_column(table, column).await
    }

    async fn begin(&mut self) -> DatabaseResult<()> {
        self.inner.begin().await
    }

    async fn commit(&mut self) -> DatabaseResult<()> {
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> DatabaseResult<()> {
        self.inner.rollback().await
    }

    fn transaction_depth(&self) -> usize {
        self.inner.transaction_depth()
    }
}
