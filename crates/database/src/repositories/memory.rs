//! 内存存储
//!
//! 用于本地开发和测试，不需要数据库即可跑通仓库和服务层的全部逻辑。

use crate::entity::{Entity, CREATED_AT, UPDATED_AT};
use crate::models::{Post, User};
use crate::query::{FilterCondition, FilterOperator, OrderDirection, Query};
use crate::repositories::traits::{ensure_uniform_columns, Row, Store};
use crate::{DatabaseError, DatabaseResult};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// 内存表结构
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<String>,
    pub primary_key: String,
    /// 主键为空时自动分配递增整数
    pub auto_increment: bool,
    /// 唯一约束列（NULL不参与比较）
    pub unique: Vec<String>,
    /// `NOT NULL` 列，主键由自增分配时不需要列出
    pub not_null: Vec<String>,
    /// 插入时缺失列的默认值，没有列出的列默认为 NULL
    pub defaults: BTreeMap<String, Value>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            primary_key: "id".to_string(),
            auto_increment: true,
            unique: Vec::new(),
            not_null: Vec::new(),
            defaults: BTreeMap::new(),
        }
    }

    /// 按实体声明生成表结构
    pub fn for_entity<E: Entity>() -> Self {
        let mut schema = Self::new(E::TABLE, E::COLUMNS);
        schema.primary_key = E::PRIMARY_KEY.to_string();
        schema
    }

    #[must_use]
    pub fn unique(mut self, column: impl Into<String>) -> Self {
        self.unique.push(column.into());
        self
    }

    #[must_use]
    pub fn not_null(mut self, columns: &[&str]) -> Self {
        self.not_null.extend(columns.iter().map(|c| c.to_string()));
        self
    }

    #[must_use]
    pub fn default_value(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(column.into(), value.into());
        self
    }

    /// 去掉某一列，用于模拟"实体声明了软删除但表里没有删除列"
    #[must_use]
    pub fn without_column(mut self, column: &str) -> Self {
        self.columns.retain(|c| c != column);
        self
    }
}

#[derive(Debug, Clone)]
struct Table {
    schema: TableSchema,
    rows: Vec<Row>,
    next_id: i64,
}

type Tables = HashMap<String, Table>;

/// 内存存储句柄
///
/// 多个句柄共享同一份数据；事务通过快照实现，回滚时整体恢复快照。
/// 快照不做隔离，所以不要在并发写入的场景下使用事务。
#[derive(Debug)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    snapshots: Vec<Tables>,
}

impl MemoryStore {
    pub fn new(schemas: impl IntoIterator<Item = TableSchema>) -> Self {
        let tables = schemas
            .into_iter()
            .map(|schema| {
                let table = Table {
                    schema: schema.clone(),
                    rows: Vec::new(),
                    next_id: 1,
                };
                (schema.name, table)
            })
            .collect();

        Self {
            tables: Arc::new(Mutex::new(tables)),
            snapshots: Vec::new(),
        }
    }

    /// 与迁移文件一致的 `users` / `posts` 表
    pub fn with_default_schema() -> Self {
        Self::new([
            TableSchema::for_entity::<User>()
                .unique("email")
                .not_null(&["name", "email", "password"])
                .default_value("password", ""),
            TableSchema::for_entity::<Post>().not_null(&["user_id", "title"]),
        ])
    }
}

/// 克隆得到的句柄共享数据，但不继承事务
impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            tables: Arc::clone(&self.tables),
            snapshots: Vec::new(),
        }
    }
}

fn table_mut<'a>(tables: &'a mut Tables, name: &str) -> DatabaseResult<&'a mut Table> {
    tables.get_mut(name).ok_or_else(|| DatabaseError::UnknownTable(name.to_string()))
}

/// JSON值的比较，数字按数值、字符串按字典序，其它类型不可比较
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Some(Ordering::Equal)
}

/// SQL `LIKE` 匹配：`%` 匹配任意长度，`_` 匹配单个字符
fn like_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    // matched[j]: pattern前i个字符能否匹配text前j个字符
    let mut matched = vec![false; text.len() + 1];
    matched[0] = true;
    for p in &pattern {
        let mut next = vec![false; text.len() + 1];
        match p {
            '%' => {
                let mut any = false;
                for j in 0..=text.len() {
                    any |= matched[j];
                    next[j] = any;
                }
            }
            _ => {
                for j in 1..=text.len() {
                    next[j] = matched[j - 1] && (*p == '_' || *p == text[j - 1]);
                }
            }
        }
        matched = next;
    }
    matched[text.len()]
}

fn matches_filter(row: &Row, filter: &FilterCondition) -> bool {
    let value = row.get(&filter.column).unwrap_or(&Value::Null);

    match filter.operator {
        FilterOperator::IsNull => value.is_null(),
        FilterOperator::IsNotNull => !value.is_null(),
        FilterOperator::Like => {
            let pattern = match &filter.value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Null => return false,
                other => other.to_string(),
            };
            like_match(&pattern, &text)
        }
        FilterOperator::In => match &filter.value {
            Value::Array(values) => values.iter().any(|v| values_equal(value, v)),
            other => values_equal(value, other),
        },
        op => {
            let Some(ordering) = compare_values(value, &filter.value) else {
                return false;
            };
            match op {
                FilterOperator::Equal => ordering == Ordering::Equal,
                FilterOperator::NotEqual => ordering != Ordering::Equal,
                FilterOperator::GreaterThan => ordering == Ordering::Greater,
                FilterOperator::GreaterThanOrEqual => ordering != Ordering::Less,
                FilterOperator::LessThan => ordering == Ordering::Less,
                FilterOperator::LessThanOrEqual => ordering != Ordering::Greater,
                _ => false,
            }
        }
    }
}

fn matches_all(row: &Row, filters: &[FilterCondition]) -> bool {
    filters.iter().all(|f| matches_filter(row, f))
}

impl Table {
    fn check_columns(&self, row: &Row) -> DatabaseResult<()> {
        match row.keys().find(|c| !self.schema.columns.contains(c)) {
            Some(column) => Err(DatabaseError::InvalidIdentifier(format!("{}.{column}", self.schema.name))),
            None => Ok(()),
        }
    }

    /// 检查列名并用默认值补齐缺失的列
    fn normalize(&self, row: Row) -> DatabaseResult<Row> {
        self.check_columns(&row)?;

        let mut normalized = Row::new();
        for column in &self.schema.columns {
            let value = row
                .get(column)
                .or_else(|| self.schema.defaults.get(column))
                .cloned()
                .unwrap_or(Value::Null);
            normalized.insert(column.clone(), value);
        }
        Ok(normalized)
    }

    fn check_not_null(&self, row: &Row) -> DatabaseResult<()> {
        let violated = self
            .schema
            .not_null
            .iter()
            .find(|column| row.get(*column).map_or(true, Value::is_null));
        match violated {
            Some(column) => Err(DatabaseError::NotNullViolation {
                table: self.schema.name.clone(),
                column: column.clone(),
            }),
            None => Ok(()),
        }
    }

    /// 唯一约束检查，`skip` 为正在更新的行
    fn check_unique(&self, row: &Row, skip: Option<usize>) -> DatabaseResult<()> {
        let mut columns = self.schema.unique.iter().chain(std::iter::once(&self.schema.primary_key));
        columns.try_for_each(|column| {
            let value = row.get(column).unwrap_or(&Value::Null);
            if value.is_null() {
                return Ok(());
            }
            let duplicated = self
                .rows
                .iter()
                .enumerate()
                .any(|(i, other)| Some(i) != skip && other.get(column).is_some_and(|v| values_equal(v, value)));
            if duplicated {
                return Err(DatabaseError::UniqueViolation {
                    table: self.schema.name.clone(),
                    column: column.clone(),
                    value: value.to_string(),
                });
            }
            Ok(())
        })
    }

    fn prepare_insert(&mut self, row: Row) -> DatabaseResult<Row> {
        let mut row = self.normalize(row)?;

        let pk = self.schema.primary_key.clone();
        if self.schema.auto_increment {
            match row.get(&pk).and_then(Value::as_i64) {
                Some(id) => self.next_id = self.next_id.max(id + 1),
                None => {
                    row.insert(pk, Value::from(self.next_id));
                    self.next_id += 1;
                }
            }
        }

        // 数据库默认值
        for column in [CREATED_AT, UPDATED_AT] {
            if row.get(column) == Some(&Value::Null) {
                row.insert(column.to_string(), Value::String(chrono::Utc::now().to_rfc3339()));
            }
        }

        self.check_not_null(&row)?;
        self.check_unique(&row, None)?;
        Ok(row)
    }

    fn position(&self, key_column: &str, key: &Value) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| row.get(key_column).is_some_and(|v| values_equal(v, key)))
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn select(&mut self, query: &Query) -> DatabaseResult<Vec<Row>> {
        debug!("🔍 [memory] 查询 {} - 条件: {:?}", query.table, query.filters);

        let mut tables = self.tables.lock().await;
        let table = table_mut(&mut tables, &query.table)?;

        let mut rows: Vec<Row> = table.rows.iter().filter(|row| matches_all(row, &query.filters)).cloned().collect();

        if let Some((column, direction)) = &query.order_by {
            rows.sort_by(|a, b| {
                let a = a.get(column).unwrap_or(&Value::Null);
                let b = b.get(column).unwrap_or(&Value::Null);
                let ordering = compare_values(a, b).unwrap_or(Ordering::Equal);
                match direction {
                    OrderDirection::Ascending => ordering,
                    OrderDirection::Descending => ordering.reverse(),
                }
            });
        }

        if let Some(pagination) = query.pagination {
            let offset = usize::try_from(pagination.offset).unwrap_or(usize::MAX);
            let limit = usize::try_from(pagination.limit).unwrap_or(usize::MAX);
            rows = rows.into_iter().skip(offset).take(limit).collect();
        }

        Ok(rows)
    }

    async fn count(&mut self, table: &str, filters: &[FilterCondition]) -> DatabaseResult<u64> {
        let mut tables = self.tables.lock().await;
        let table = table_mut(&mut tables, table)?;
        Ok(table.rows.iter().filter(|row| matches_all(row, filters)).count() as u64)
    }

    async fn insert(&mut self, table: &str, row: Row) -> DatabaseResult<Row> {
        debug!("📝 [memory] 插入 {}: {:?}", table, row);

        let mut tables = self.tables.lock().await;
        let table = table_mut(&mut tables, table)?;
        let row = table.prepare_insert(row)?;
        table.rows.push(row.clone());
        Ok(row)
    }

    async fn insert_many(&mut self, table: &str, rows: Vec<Row>) -> DatabaseResult<u64> {
        ensure_uniform_columns(table, &rows)?;
        let mut tables = self.tables.lock().await;
        let table = table_mut(&mut tables, table)?;

        // 单条语句是原子的：任何一行失败都不写入
        let mut staged = table.clone();
        for row in rows {
            let row = staged.prepare_insert(row)?;
            staged.rows.push(row);
        }
        let inserted = (staged.rows.len() - table.rows.len()) as u64;
        *table = staged;
        Ok(inserted)
    }

    async fn update(&mut self, table: &str, key_column: &str, key: &Value, changes: Row) -> DatabaseResult<Option<Row>> {
        debug!("🔄 [memory] 更新 {} {} = {}: {:?}", table, key_column, key, changes);

        let mut tables = self.tables.lock().await;
        let table = table_mut(&mut tables, table)?;
        let Some(index) = table.position(key_column, key) else {
            return Ok(None);
        };

        table.check_columns(&changes)?;

        let mut updated = table.rows[index].clone();
        updated.extend(changes);
        table.check_not_null(&updated)?;
        table.check_unique(&updated, Some(index))?;
        table.rows[index] = updated.clone();
        Ok(Some(updated))
    }

    async fn delete(&mut self, table: &str, key_column: &str, key: &Value) -> DatabaseResult<u64> {
        debug!("🗑️ [memory] 删除 {} {} = {}", table, key_column, key);

        let mut tables = self.tables.lock().await;
        let table = table_mut(&mut tables, table)?;
        let before = table.rows.len();
        table.rows.retain(|row| !row.get(key_column).is_some_and(|v| values_equal(v, key)));
        Ok((before - table.rows.len()) as u64)
    }

    async fn has_column(&mut self, table: &str, column: &str) -> DatabaseResult<bool> {
        let tables = self.tables.lock().await;
        Ok(tables.get(table).is_some_and(|t| t.schema.columns.iter().any(|c| c == column)))
    }

    async fn begin(&mut self) -> DatabaseResult<()> {
        let snapshot = self.tables.lock().await.clone();
        self.snapshots.push(snapshot);
        Ok(())
    }

    async fn commit(&mut self) -> DatabaseResult<()> {
        self.snapshots
            .pop()
            .map(|_| ())
            .ok_or_else(|| DatabaseError::transaction("没有正在进行的事务，无法提交"))
    }

    async fn rollback(&mut self) -> DatabaseResult<()> {
        let snapshot = self
            .snapshots
            .pop()
            .ok_or_else(|| DatabaseError::transaction("没有正在进行的事务，无法回滚"))?;
        *self.tables.lock().await = snapshot;
        Ok(())
    }

    fn transaction_depth(&self) -> usize {
        self.snapshots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_like_match() {
        assert!(like_match("A%", "Alice"));
        assert!(like_match("%ice", "Alice"));
        assert!(like_match("A_ice", "Alice"));
        assert!(like_match("%", ""));
        assert!(!like_match("A_", "Alice"));
        assert!(!like_match("B%", "Alice"));
    }

    #[test]
    fn test_matches_filter_operators() {
        let r = row(json!({"id": 3, "name": "Alice", "deleted_at": null}));

        assert!(matches_filter(&r, &FilterCondition::eq("id", 3)));
        assert!(matches_filter(&r, &FilterCondition::ne("id", 4)));
        assert!(matches_filter(&r, &FilterCondition::gte("id", 3)));
        assert!(!matches_filter(&r, &FilterCondition::gt("id", 3)));
        assert!(matches_filter(&r, &FilterCondition::lt("id", 3.5)));
        assert!(matches_filter(&r, &FilterCondition::in_list("id", [1, 3])));
        assert!(matches_filter(&r, &FilterCondition::is_null("deleted_at")));
        assert!(!matches_filter(&r, &FilterCondition::is_not_null("deleted_at")));
        assert!(matches_filter(&r, &FilterCondition::like("name", "Al%")));
        // NULL 不等于任何值
        assert!(!matches_filter(&r, &FilterCondition::eq("deleted_at", "x")));
    }

    #[tokio::test]
    async fn test_insert_assigns_keys_and_enforces_unique() {
        let mut store = MemoryStore::with_default_schema();

        let first = store.insert("users", row(json!({"name": "A", "email": "a@x.com"}))).await.unwrap();
        let second = store.insert("users", row(json!({"name": "B", "email": "b@x.com"}))).await.unwrap();
        assert_eq!(first["id"], json!(1));
        assert_eq!(second["id"], json!(2));
        assert!(first["created_at"].is_string());
        assert!(first["deleted_at"].is_null());

        let duplicated = store.insert("users", row(json!({"name": "C", "email": "a@x.com"}))).await;
        assert!(matches!(duplicated, Err(DatabaseError::UniqueViolation { .. })));

        let unknown = store.insert("users", row(json!({"nickname": "C"}))).await;
        assert!(matches!(unknown, Err(DatabaseError::InvalidIdentifier(_))));
    }

    #[tokio::test]
    async fn test_defaults_and_not_null_columns() {
        let mut store = MemoryStore::with_default_schema();

        let user = store.insert("users", row(json!({"name": "A", "email": "a@x.com"}))).await.unwrap();
        assert_eq!(user["password"], json!(""));

        let missing_name = store.insert("users", row(json!({"email": "b@x.com"}))).await;
        assert!(matches!(missing_name, Err(DatabaseError::NotNullViolation { ref column, .. }) if column == "name"));
        let null_email = store.insert("users", row(json!({"name": "B", "email": null}))).await;
        assert!(matches!(null_email, Err(DatabaseError::NotNullViolation { ref column, .. }) if column == "email"));
        assert_eq!(store.count("users", &[]).await.unwrap(), 1);

        let cleared = store.update("users", "id", &json!(1), row(json!({"name": null}))).await;
        assert!(matches!(cleared, Err(DatabaseError::NotNullViolation { .. })));
        let rows = store.select(&Query::table("users")).await.unwrap();
        assert_eq!(rows[0]["name"], json!("A"));

        let post = store.insert("posts", row(json!({"title": "orphan"}))).await;
        assert!(matches!(post, Err(DatabaseError::NotNullViolation { ref column, .. }) if column == "user_id"));
    }

    #[tokio::test]
    async fn test_insert_many_is_atomic() {
        let mut store = MemoryStore::with_default_schema();

        let rows = vec![
            row(json!({"name": "A", "email": "a@x.com"})),
            row(json!({"name": "B", "email": "a@x.com"})),
        ];
        assert!(store.insert_many("users", rows).await.is_err());
        assert_eq!(store.count("users", &[]).await.unwrap(), 0);

        let mixed = vec![
            row(json!({"name": "A", "email": "a@x.com"})),
            row(json!({"name": "B", "email": "b@x.com", "password": "h"})),
        ];
        let err = store.insert_many("users", mixed).await.unwrap_err();
        assert!(matches!(err, DatabaseError::ColumnMismatch { index: 1, .. }));
        assert_eq!(store.count("users", &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_select_order_and_paginate() {
        let mut store = MemoryStore::with_default_schema();
        for name in ["C", "A", "B"] {
            let email = format!("{name}@x.com");
            store.insert("users", row(json!({"name": name, "email": email}))).await.unwrap();
        }

        let query = Query::table("users")
            .order_by("name", OrderDirection::Descending)
            .paginate(crate::query::Pagination::new(1, 1));
        let rows = store.select(&query).await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], json!("B"));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let mut store = MemoryStore::with_default_schema();
        store.insert("users", row(json!({"name": "A", "email": "a@x.com"}))).await.unwrap();

        let updated = store.update("users", "id", &json!(1), row(json!({"name": "Z"}))).await.unwrap().unwrap();
        assert_eq!(updated["name"], json!("Z"));
        assert!(store.update("users", "id", &json!(9), row(json!({"name": "Z"}))).await.unwrap().is_none());

        assert_eq!(store.delete("users", "id", &json!(1)).await.unwrap(), 1);
        assert_eq!(store.delete("users", "id", &json!(1)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_nested_transactions_rollback_to_snapshot() {
        let mut store = MemoryStore::with_default_schema();
        store.begin().await.unwrap();
        store.insert("users", row(json!({"name": "A", "email": "a@x.com"}))).await.unwrap();

        store.begin().await.unwrap();
        store.insert("users", row(json!({"name": "B", "email": "b@x.com"}))).await.unwrap();
        assert_eq!(store.transaction_depth(), 2);
        store.rollback().await.unwrap();
        assert_eq!(store.count("users", &[]).await.unwrap(), 1);

        store.commit().await.unwrap();
        assert_eq!(store.transaction_depth(), 0);
        assert_eq!(store.count("users", &[]).await.unwrap(), 1);

        assert!(store.commit().await.is_err());
        assert!(store.rollback().await.is_err());
    }

    #[tokio::test]
    async fn test_has_column() {
        let mut store = MemoryStore::new([TableSchema::for_entity::<User>().without_column("deleted_at")]);
        assert!(store.has_column("users", "email").await.unwrap());
        assert!(!store.has_column("users", "deleted_at").await.unwrap());
        assert!(!store.has_column("posts", "id").await.unwrap());
    }
}
