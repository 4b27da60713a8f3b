//! PostgreSQL 存储
//!
//! 负责把仓库层的单表操作翻译为SQL并执行

use crate::query::{FilterCondition, FilterOperator, Query};
use crate::repositories::traits::{ensure_uniform_columns, Row, Store};
use crate::{DatabaseError, DatabasePool, DatabaseResult};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Transaction};
use std::fmt;
use tracing::debug;

/// 在当前事务（如果有）或者连接池上执行查询
macro_rules! execute_on {
    ($self:ident, $query:expr, $method:ident) => {
        match $self.tx.as_mut() {
            Some(tx) => $query.$method(&mut **tx).await,
            None => $query.$method(&$self.pool).await,
        }
    };
}

/// PostgreSQL 存储句柄
///
/// 行数据通过 `jsonb` 在SQL和Rust之间交换：
/// - 读取时使用 `to_jsonb(t)` 把整行转为JSON对象
/// - 写入时使用 `jsonb_populate_record(NULL::表名, $1)` 让数据库按列类型解析JSON，
///   这样时间戳、数字等类型都由PostgreSQL自己完成转换
///
/// 表名和列名无法使用预处理参数，拼接前都会经过 [`quote_ident`] 校验。
pub struct PgStore {
    pool: DatabasePool,
    tx: Option<Transaction<'static, Postgres>>,
    depth: usize,
}

impl PgStore {
    /// 创建新的存储句柄
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool, tx: None, depth: 0 }
    }
}

/// 克隆得到的是一个不在事务中的新句柄
///
/// 注意：pool已经是一个智能指针了，所以可以使用.clone()安全跨线程使用
impl Clone for PgStore {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}

impl fmt::Debug for PgStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgStore").field("depth", &self.depth).finish_non_exhaustive()
    }
}

/// 校验并引用标识符，支持 `schema.table` 形式
pub(crate) fn quote_ident(name: &str) -> DatabaseResult<String> {
    let valid_part = |part: &str| {
        let mut chars = part.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };

    if name.is_empty() || !name.split('.').all(valid_part) {
        return Err(DatabaseError::InvalidIdentifier(name.to_string()));
    }

    Ok(name.split('.').map(|part| format!("\"{part}\"")).collect::<Vec<_>>().join("."))
}

/// 拼接 `WHERE` 子句
///
/// 比较类条件的右值通过 `jsonb_populate_record` 转换为列的实际类型，
/// 所以 `t.id = ...` 这样的比较不会因为参数类型不匹配而失败。
fn push_where(builder: &mut QueryBuilder<'static, Postgres>, table: &str, filters: &[FilterCondition]) -> DatabaseResult<()> {
    if filters.is_empty() {
        return Ok(());
    }

    builder.push(" WHERE ");
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            builder.push(" AND ");
        }
        push_condition(builder, table, filter)?;
    }
    Ok(())
}

fn push_condition(builder: &mut QueryBuilder<'static, Postgres>, table: &str, filter: &FilterCondition) -> DatabaseResult<()> {
    let column = quote_ident(&filter.column)?;

    match filter.operator {
        FilterOperator::IsNull | FilterOperator::IsNotNull => {
            builder.push(format!("t.{column} {}", filter.operator));
        }
        FilterOperator::Like => {
            let pattern = match &filter.value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            builder.push(format!("t.{column}::text LIKE "));
            builder.push_bind(pattern);
        }
        FilterOperator::In => {
            let values = match &filter.value {
                Value::Array(values) => values.clone(),
                other => vec![other.clone()],
            };
            builder.push(format!(
                "t.{column} IN (SELECT (jsonb_populate_record(NULL::{table}, jsonb_build_object("
            ));
            builder.push_bind(filter.column.clone());
            builder.push(format!("::text, v))).{column} FROM jsonb_array_elements("));
            builder.push_bind(Json(Value::Array(values)));
            builder.push(") AS v)");
        }
        _ => {
            let mut record = Map::new();
            record.insert(filter.column.clone(), filter.value.clone());
            builder.push(format!("t.{column} {} (jsonb_populate_record(NULL::{table}, ", filter.operator));
            builder.push_bind(Json(Value::Object(record)));
            builder.push(format!(")).{column}"));
        }
    }
    Ok(())
}

/// 把 `to_jsonb(t)` 的结果转为行
fn into_row(value: Json<Value>) -> DatabaseResult<Row> {
    match value.0 {
        Value::Object(row) => Ok(row),
        other => Err(DatabaseError::SerializationError(serde::de::Error::custom(format!(
            "期望JSON对象，实际为: {other}"
        )))),
    }
}

fn column_list(row: &Row) -> DatabaseResult<String> {
    Ok(row.keys().map(|c| quote_ident(c)).collect::<DatabaseResult<Vec<_>>>()?.join(", "))
}

/// 批量插入语句，所有行的列必须一致
///
/// ```sql
/// INSERT INTO "users" ("email", "name") SELECT "email", "name" FROM jsonb_populate_recordset(NULL::"users", $1)
/// ```
fn insert_many_query(table: &str, rows: Vec<Row>) -> DatabaseResult<QueryBuilder<'static, Postgres>> {
    ensure_uniform_columns(table, &rows)?;
    let columns = rows.first().map(column_list).transpose()?.unwrap_or_default();
    let table = quote_ident(table)?;
    let records = rows.into_iter().map(Value::Object).collect();

    let mut builder = QueryBuilder::new(format!(
        "INSERT INTO {table} ({columns}) SELECT {columns} FROM jsonb_populate_recordset(NULL::{table}, "
    ));
    builder.push_bind(Json(Value::Array(records)));
    builder.push(")");
    Ok(builder)
}

#[async_trait::async_trait]
impl Store for PgStore {
    /// 查询满足条件的行
    ///
    /// # SQL 查询说明
    ///
    /// ```sql
    /// SELECT to_jsonb(t) FROM users AS t
    /// WHERE t."deleted_at" IS NULL AND t."email" = (jsonb_populate_record(NULL::"users", $1))."email"
    /// ORDER BY t."id" ASC
    /// LIMIT $2 OFFSET $3
    /// ```
    async fn select(&mut self, query: &Query) -> DatabaseResult<Vec<Row>> {
        debug!("🔍 查询 {} - 条件: {:?}, 分页: {:?}", query.table, query.filters, query.pagination);

        let table = quote_ident(&query.table)?;
        let mut builder = QueryBuilder::new(format!("SELECT to_jsonb(t) FROM {table} AS t"));
        push_where(&mut builder, &table, &query.filters)?;

        if let Some((column, direction)) = &query.order_by {
            builder.push(format!(" ORDER BY t.{} {direction}", quote_ident(column)?));
        }
        if let Some(pagination) = query.pagination {
            builder.push(" LIMIT ");
            builder.push_bind(i64::try_from(pagination.limit).unwrap_or(i64::MAX));
            builder.push(" OFFSET ");
            builder.push_bind(i64::try_from(pagination.offset).unwrap_or(i64::MAX));
        }

        let rows: Vec<Json<Value>> = execute_on!(self, builder.build_query_scalar(), fetch_all)?;
        debug!("✅ 查询完成 - {} 行", rows.len());

        rows.into_iter().map(into_row).collect()
    }

    async fn count(&mut self, table: &str, filters: &[FilterCondition]) -> DatabaseResult<u64> {
        let table = quote_ident(table)?;
        let mut builder = QueryBuilder::new(format!("SELECT COUNT(*) FROM {table} AS t"));
        push_where(&mut builder, &table, filters)?;

        let total: i64 = execute_on!(self, builder.build_query_scalar(), fetch_one)?;
        Ok(u64::try_from(total).unwrap_or_default())
    }

    async fn insert(&mut self, table: &str, row: Row) -> DatabaseResult<Row> {
        debug!("📝 插入 {}: {:?}", table, row);

        let table = quote_ident(table)?;
        let mut builder = if row.is_empty() {
            QueryBuilder::new(format!("INSERT INTO {table} AS t DEFAULT VALUES"))
        } else {
            let columns = column_list(&row)?;
            let mut builder = QueryBuilder::new(format!(
                "INSERT INTO {table} AS t ({columns}) SELECT {columns} FROM jsonb_populate_record(NULL::{table}, "
            ));
            builder.push_bind(Json(Value::Object(row)));
            builder.push(")");
            builder
        };
        builder.push(" RETURNING to_jsonb(t)");

        let inserted: Json<Value> = execute_on!(self, builder.build_query_scalar(), fetch_one)?;
        into_row(inserted)
    }

    async fn insert_many(&mut self, table: &str, rows: Vec<Row>) -> DatabaseResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        debug!("📝 批量插入 {}: {} 行", table, rows.len());

        let mut builder = insert_many_query(table, rows)?;
        let result = execute_on!(self, builder.build(), execute)?;
        Ok(result.rows_affected())
    }

    /// 按主键更新部分列
    ///
    /// ## SQL
    ///
    /// ```sql
    /// UPDATE users AS t
    /// SET ("name", "updated_at") = (SELECT "name", "updated_at" FROM jsonb_populate_record(NULL::"users", $1))
    /// WHERE t."id" = (jsonb_populate_record(NULL::"users", $2))."id"
    /// RETURNING to_jsonb(t)
    /// ```
    async fn update(&mut self, table: &str, key_column: &str, key: &Value, changes: Row) -> DatabaseResult<Option<Row>> {
        debug!("🔄 更新 {} {} = {}: {:?}", table, key_column, key, changes);

        let key_filter = [FilterCondition::eq(key_column, key.clone())];
        if changes.is_empty() {
            let query = Query::table(table).filters(key_filter.to_vec());
            return Ok(self.select(&query).await?.into_iter().next());
        }

        let quoted = quote_ident(table)?;
        let columns = column_list(&changes)?;
        let mut builder = QueryBuilder::new(format!(
            "UPDATE {quoted} AS t SET ({columns}) = (SELECT {columns} FROM jsonb_populate_record(NULL::{quoted}, "
        ));
        builder.push_bind(Json(Value::Object(changes)));
        builder.push("))");
        push_where(&mut builder, &quoted, &key_filter)?;
        builder.push(" RETURNING to_jsonb(t)");

        let updated: Option<Json<Value>> = execute_on!(self, builder.build_query_scalar(), fetch_optional)?;
        updated.map(into_row).transpose()
    }

    async fn delete(&mut self, table: &str, key_column: &str, key: &Value) -> DatabaseResult<u64> {
        debug!("🗑️ 删除 {} {} = {}", table, key_column, key);

        let quoted = quote_ident(table)?;
        let mut builder = QueryBuilder::new(format!("DELETE FROM {quoted} AS t"));
        push_where(&mut builder, &quoted, &[FilterCondition::eq(key_column, key.clone())])?;

        let result = execute_on!(self, builder.build(), execute)?;
        Ok(result.rows_affected())
    }

    async fn has_column(&mut self, table: &str, column: &str) -> DatabaseResult<bool> {
        let (schema, table) = match table.split_once('.') {
            Some((schema, table)) => (Some(schema.to_string()), table.to_string()),
            None => (None, table.to_string()),
        };

        let mut builder = QueryBuilder::new(
            "SELECT EXISTS (SELECT 1 FROM information_schema.columns WHERE table_schema = COALESCE(",
        );
        builder.push_bind(schema);
        builder.push(", current_schema()) AND table_name = ");
        builder.push_bind(table);
        builder.push(" AND column_name = ");
        builder.push_bind(column.to_string());
        builder.push(")");

        let exists: bool = execute_on!(self, builder.build_query_scalar(), fetch_one)?;
        Ok(exists)
    }

    async fn begin(&mut self) -> DatabaseResult<()> {
        match self.tx.as_mut() {
            None => {
                self.tx = Some(self.pool.begin().await?);
            }
            Some(tx) => {
                sqlx::query(&format!("SAVEPOINT sp_{}", self.depth)).execute(&mut **tx).await?;
            }
        }
        self.depth += 1;
        debug!("🔒 开启事务，当前层数 {}", self.depth);
        Ok(())
    }

    async fn commit(&mut self) -> DatabaseResult<()> {
        match self.depth {
            0 => return Err(DatabaseError::transaction("没有正在进行的事务，无法提交")),
            1 => {
                if let Some(tx) = self.tx.take() {
                    tx.commit().await?;
                }
            }
            depth => {
                if let Some(tx) = self.tx.as_mut() {
                    sqlx::query(&format!("RELEASE SAVEPOINT sp_{}", depth - 1)).execute(&mut **tx).await?;
                }
            }
        }
        self.depth -= 1;
        debug!("✅ 提交事务，当前层数 {}", self.depth);
        Ok(())
    }

    async fn rollback(&mut self) -> DatabaseResult<()> {
        match self.depth {
            0 => return Err(DatabaseError::transaction("没有正在进行的事务，无法回滚")),
            1 => {
                if let Some(tx) = self.tx.take() {
                    tx.rollback().await?;
                }
            }
            depth => {
                if let Some(tx) = self.tx.as_mut() {
                    sqlx::query(&format!("ROLLBACK TO SAVEPOINT sp_{}", depth - 1)).execute(&mut **tx).await?;
                }
            }
        }
        self.depth -= 1;
        debug!("↩️ 回滚事务，当前层数 {}", self.depth);
        Ok(())
    }

    fn transaction_depth(&self) -> usize {
        self.depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users").unwrap(), "\"users\"");
        assert_eq!(quote_ident("hm.users").unwrap(), "\"hm\".\"users\"");
        assert_eq!(quote_ident("_deleted_at2").unwrap(), "\"_deleted_at2\"");
    }

    #[test]
    fn test_quote_ident_rejects_injection() {
        for name in ["", "users; DROP TABLE users", "na\"me", "1abc", "a..b", "name "] {
            assert!(matches!(quote_ident(name), Err(DatabaseError::InvalidIdentifier(_))), "{name}");
        }
    }

    #[test]
    fn test_push_where_renders_conditions() {
        let filters = vec![
            FilterCondition::eq("email", "a@x.com"),
            FilterCondition::is_null("deleted_at"),
            FilterCondition::like("name", "A%"),
        ];
        let mut builder = QueryBuilder::new("SELECT to_jsonb(t) FROM \"users\" AS t");
        push_where(&mut builder, "\"users\"", &filters).unwrap();

        assert_eq!(
            builder.sql(),
            "SELECT to_jsonb(t) FROM \"users\" AS t WHERE \
             t.\"email\" = (jsonb_populate_record(NULL::\"users\", $1)).\"email\" \
             AND t.\"deleted_at\" IS NULL \
             AND t.\"name\"::text LIKE $2"
        );
    }

    #[test]
    fn test_push_where_renders_in_list() {
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM \"posts\" AS t");
        push_where(&mut builder, "\"posts\"", &[FilterCondition::in_list("user_id", [1, 2])]).unwrap();

        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) FROM \"posts\" AS t WHERE t.\"user_id\" IN (SELECT \
             (jsonb_populate_record(NULL::\"posts\", jsonb_build_object($1::text, v))).\"user_id\" \
             FROM jsonb_array_elements($2) AS v)"
        );
    }

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_insert_many_query() {
        let rows = vec![
            row(serde_json::json!({"name": "A", "email": "a@x.com"})),
            row(serde_json::json!({"email": "b@x.com", "name": "B"})),
        ];
        let builder = insert_many_query("users", rows).unwrap();
        let columns = column_list(&row(serde_json::json!({"name": "", "email": ""}))).unwrap();

        assert_eq!(
            builder.sql(),
            format!("INSERT INTO \"users\" ({columns}) SELECT {columns} FROM jsonb_populate_recordset(NULL::\"users\", $1)")
        );
    }

    #[test]
    fn test_insert_many_query_rejects_mixed_columns() {
        let rows = vec![
            row(serde_json::json!({"name": "A", "email": "a@x.com"})),
            row(serde_json::json!({"name": "B", "email": "b@x.com", "password": "h"})),
        ];
        let err = insert_many_query("users", rows).err().expect("expected column mismatch error");
        assert!(matches!(err, DatabaseError::ColumnMismatch { index: 1, .. }));
    }
}
