//! 通用仓库
//!
//! [`Repository`] 绑定一个实体类型和一个存储引擎，提供通用的增删改查、软删除和分页能力。
//! 仓库实例上持有查询作用域（预加载、统计、软删除可见性），所以每个请求都应该创建自己的实例。

use crate::entity::{Attributes, Entity, Reference, RelationKind, Relation, CREATED_AT, UPDATED_AT};
use crate::query::{FilterCondition, OrderDirection, Paginated, Pagination, Query, QueryScope, TrashedVisibility};
use crate::repositories::error::{RepositoryError, RepositoryResult};
use crate::repositories::traits::{Row, Store};
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde_json::Value;
use std::marker::PhantomData;
use tracing::{debug, error, warn};

/// 游标每次从存储层读取的行数
pub const DEFAULT_CHUNK_SIZE: u64 = 100;

/// 通用仓库
///
/// # 示例
///
/// ```rust,ignore
/// let mut users = Repository::<User, _>::new(PgStore::new(pool.clone()));
/// let page = users.with(["posts"]).only_trashed().get_all_paginated(vec![], 15, 1).await?;
/// ```
#[derive(Debug)]
pub struct Repository<E: Entity, S: Store> {
    store: S,
    scope: QueryScope,
    chunk_size: u64,
    /// 表中是否存在软删除列，第一次查询后缓存
    deletion_column: Option<bool>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity, S: Store> Repository<E, S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            scope: QueryScope::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            deletion_column: None,
            _entity: PhantomData,
        }
    }

    /// 当前的查询作用域
    pub fn scope(&self) -> &QueryScope {
        &self.scope
    }

    /// 预加载关联
    pub fn with<I>(&mut self, relations: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.scope.with.extend(relations.into_iter().map(Into::into));
        self
    }

    /// 统计关联数量，结果放在 `<关联名>_count` 字段
    pub fn with_count<I>(&mut self, relations: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.scope.with_count.extend(relations.into_iter().map(Into::into));
        self
    }

    pub fn with_trashed(&mut self) -> &mut Self {
        self.scope.trashed = TrashedVisibility::Include;
        self
    }

    pub fn only_trashed(&mut self) -> &mut Self {
        self.scope.trashed = TrashedVisibility::Only;
        self
    }

    pub fn without_trashed(&mut self) -> &mut Self {
        self.scope.trashed = TrashedVisibility::Exclude;
        self
    }

    /// 游标每批读取的行数，最小为1
    pub fn chunk_size(&mut self, size: u64) -> &mut Self {
        self.chunk_size = size.max(1);
        self
    }

    /// 实体是否声明了软删除能力
    pub fn is_soft_deletable(&self) -> bool {
        E::CAPABILITIES.soft_deletes
    }

    /// 数据表中是否存在软删除列
    pub async fn has_deletion_column(&mut self) -> RepositoryResult<bool> {
        if let Some(exists) = self.deletion_column {
            return Ok(exists);
        }
        let exists = self.store.has_column(E::TABLE, E::CAPABILITIES.deleted_at_column).await?;
        self.deletion_column = Some(exists);
        Ok(exists)
    }

    /// 开启事务，已在事务中时创建保存点
    pub async fn begin_transaction(&mut self) -> RepositoryResult<()> {
        debug!("🔒 开启事务 - 当前层数: {}", self.store.transaction_depth());
        Ok(self.store.begin().await?)
    }

    pub async fn commit_transaction(&mut self) -> RepositoryResult<()> {
        debug!("✅ 提交事务 - 当前层数: {}", self.store.transaction_depth());
        Ok(self.store.commit().await?)
    }

    pub async fn rollback_transaction(&mut self) -> RepositoryResult<()> {
        warn!("↩️ 回滚事务 - 当前层数: {}", self.store.transaction_depth());
        Ok(self.store.rollback().await?)
    }

    /// 把主键或实体解析为实体
    ///
    /// 传入实体时只检查类型，原样返回；传入主键时按主键查询，包含已软删除的记录，
    /// 不使用也不修改当前的查询作用域。
    pub async fn resolve_model(&mut self, reference: Reference<E>) -> RepositoryResult<E> {
        match reference {
            Reference::Entity(entity) => entity
                .downcast::<E>()
                .map_err(|other| RepositoryError::not_an_entity_of(E::NAME, other.entity_name())),
            Reference::Key(key) => {
                let key: Value = key.into();
                let query = Query::table(E::TABLE)
                    .filters(vec![FilterCondition::eq(E::PRIMARY_KEY, key.clone())])
                    .paginate(Pagination::new(0, 1));

                let row = self.store.select(&query).await?.into_iter().next();
                match row {
                    Some(row) => Self::from_row(row),
                    None => Err(RepositoryError::not_found(E::NAME, E::PRIMARY_KEY, display_value(&key))),
                }
            }
        }
    }

    /// 分页查询
    ///
    /// # 参数
    /// - `filters`: 过滤条件
    /// - `page_size`: 页面大小，最小为1
    /// - `page`: 页码，从1开始
    pub async fn get_all_paginated(&mut self, filters: Vec<FilterCondition>, page_size: u64, page: u64) -> RepositoryResult<Paginated<E>> {
        debug!("🔍 分页查询{} - 条件: {:?}, 页面大小: {}, 页码: {}", E::NAME, filters, page_size, page);

        let page_size = page_size.max(1);
        let page = page.max(1);
        let filters = self.prepare(filters).await?;

        let total = self.store.count(E::TABLE, &filters).await?;
        let query = Query::table(E::TABLE)
            .filters(filters)
            .order_by(E::PRIMARY_KEY, OrderDirection::Ascending)
            .paginate(Pagination::page(page, page_size));
        let rows = self.store.select(&query).await?;
        let data = self.hydrate(rows).await?;

        Ok(Paginated::new(data, total, page_size, page))
    }

    pub async fn get_all(&mut self, filters: Vec<FilterCondition>) -> RepositoryResult<Vec<E>> {
        debug!("🔍 查询全部{} - 条件: {:?}", E::NAME, filters);

        let filters = self.prepare(filters).await?;
        let query = Query::table(E::TABLE)
            .filters(filters)
            .order_by(E::PRIMARY_KEY, OrderDirection::Ascending);
        let rows = self.store.select(&query).await?;
        self.hydrate(rows).await
    }

    /// 游标查询
    ///
    /// 按主键顺序分批读取，每批 `chunk_size` 行。流只能向前消费一次，
    /// 消费期间独占仓库。
    pub fn get_all_as_cursor(&mut self, filters: Vec<FilterCondition>) -> BoxStream<'_, RepositoryResult<E>> {
        let cursor = Cursor {
            repository: self,
            filters,
            after: None,
            exhausted: false,
        };

        stream::try_unfold(cursor, Cursor::next_chunk)
            .map_ok(|chunk| stream::iter(chunk.into_iter().map(Ok::<E, RepositoryError>)))
            .try_flatten()
            .boxed()
    }

    /// 统计数量，只使用过滤条件和软删除可见性
    pub async fn count(&mut self, filters: Vec<FilterCondition>) -> RepositoryResult<u64> {
        let filters = self.scoped_filters(filters).await?;
        Ok(self.store.count(E::TABLE, &filters).await?)
    }

    /// 按列查询单条记录，默认使用主键
    pub async fn find_or_fail(&mut self, key: impl Into<Value>, column: Option<&str>) -> RepositoryResult<E> {
        let key = key.into();
        let column = column.unwrap_or(E::PRIMARY_KEY);
        debug!("🔍 查询{} - {} = {}", E::NAME, column, key);

        let filters = self.prepare(vec![FilterCondition::eq(column, key.clone())]).await?;
        let query = Query::table(E::TABLE)
            .filters(filters)
            .order_by(E::PRIMARY_KEY, OrderDirection::Ascending)
            .paginate(Pagination::new(0, 1));
        let rows = self.store.select(&query).await?;

        self.hydrate(rows)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RepositoryError::not_found(E::NAME, column, display_value(&key)))
    }

    /// 按属性相等查询全部匹配的记录
    pub async fn find_many(&mut self, attributes: Attributes) -> RepositoryResult<Vec<E>> {
        self.get_all(FilterCondition::from_attributes(&attributes)).await
    }

    /// 创建记录
    ///
    /// # 返回值
    /// 存储层失败时记录日志并返回 `None`
    pub async fn create(&mut self, data: Attributes) -> RepositoryResult<Option<E>> {
        debug!("📝 创建{}: {:?}", E::NAME, data.keys().collect::<Vec<_>>());

        Self::validate_attributes(&data)?;
        let row = with_creation_timestamps::<E>(data);

        match self.store.insert(E::TABLE, row).await {
            Ok(row) => Self::from_row(row).map(Some),
            Err(e) => {
                error!("❌ 创建{}失败: {}", E::NAME, e);
                Ok(None)
            }
        }
    }

    /// 批量插入，不返回实体、不维护时间戳
    pub async fn insert(&mut self, rows: Vec<Attributes>) -> RepositoryResult<bool> {
        debug!("📝 批量插入{} - 行数: {}", E::NAME, rows.len());

        for row in &rows {
            Self::validate_attributes(row)?;
        }
        if rows.is_empty() {
            return Ok(true);
        }

        match self.store.insert_many(E::TABLE, rows).await {
            Ok(inserted) => {
                debug!("✅ 批量插入{}完成 - 行数: {}", E::NAME, inserted);
                Ok(true)
            }
            Err(e) => {
                error!("❌ 批量插入{}失败: {}", E::NAME, e);
                Ok(false)
            }
        }
    }

    /// 匹配到记录（包含已软删除的）时更新，否则用两组属性的并集创建
    pub async fn update_or_create(&mut self, attributes: Attributes, data: Attributes) -> RepositoryResult<Option<E>> {
        Self::validate_attributes(&attributes)?;
        Self::validate_attributes(&data)?;

        let query = Query::table(E::TABLE)
            .filters(FilterCondition::from_attributes(&attributes))
            .order_by(E::PRIMARY_KEY, OrderDirection::Ascending)
            .paginate(Pagination::new(0, 1));

        let existing = match self.store.select(&query).await {
            Ok(rows) => rows.into_iter().next(),
            Err(e) => {
                error!("❌ 查询{}失败: {}", E::NAME, e);
                return Ok(None);
            }
        };

        match existing {
            Some(row) => {
                let key = row.get(E::PRIMARY_KEY).cloned().unwrap_or(Value::Null);
                self.update_row(&key, data).await
            }
            None => {
                let mut merged = attributes;
                merged.extend(data);
                self.create(merged).await
            }
        }
    }

    /// 部分更新
    ///
    /// # 返回值
    /// 返回更新后的实体，存储层失败时记录日志并返回 `None`
    pub async fn update(&mut self, reference: Reference<E>, data: Attributes) -> RepositoryResult<Option<E>> {
        Self::validate_attributes(&data)?;
        let key: Value = self.resolve_model(reference).await?.key().into();
        self.update_row(&key, data).await
    }

    /// 物理删除
    pub async fn delete(&mut self, reference: Reference<E>) -> RepositoryResult<bool> {
        let entity = self.resolve_model(reference).await?;
        let key: Value = entity.key().into();
        debug!("🗑️ 删除{} - {} = {}", E::NAME, E::PRIMARY_KEY, key);

        match self.store.delete(E::TABLE, E::PRIMARY_KEY, &key).await {
            Ok(deleted) => Ok(deleted > 0),
            Err(e) => {
                error!("❌ 删除{}失败: {}", E::NAME, e);
                Ok(false)
            }
        }
    }

    /// 软删除：设置删除时间，记录保留
    pub async fn soft_delete(&mut self, reference: Reference<E>) -> RepositoryResult<bool> {
        self.set_deleted_at(reference, now()).await
    }

    /// 恢复已软删除的记录
    pub async fn restore(&mut self, reference: Reference<E>) -> RepositoryResult<bool> {
        self.set_deleted_at(reference, Value::Null).await
    }

    async fn set_deleted_at(&mut self, reference: Reference<E>, value: Value) -> RepositoryResult<bool> {
        if !self.is_soft_deletable() || !self.has_deletion_column().await? {
            return Err(RepositoryError::soft_delete_unsupported(E::NAME));
        }

        let key: Value = self.resolve_model(reference).await?.key().into();
        let mut changes = Attributes::new();
        changes.insert(E::CAPABILITIES.deleted_at_column.to_string(), value);

        Ok(self.update_row(&key, changes).await?.is_some())
    }

    async fn update_row(&mut self, key: &Value, data: Attributes) -> RepositoryResult<Option<E>> {
        debug!("🔄 更新{} - {} = {}", E::NAME, E::PRIMARY_KEY, key);

        let mut changes = data;
        if E::CAPABILITIES.timestamps && E::has_column(UPDATED_AT) {
            changes.insert(UPDATED_AT.to_string(), now());
        }

        match self.store.update(E::TABLE, E::PRIMARY_KEY, key, changes).await {
            Ok(Some(row)) => Self::from_row(row).map(Some),
            Ok(None) => {
                warn!("⚠️ 更新{}时记录已不存在 - {} = {}", E::NAME, E::PRIMARY_KEY, key);
                Ok(None)
            }
            Err(e) => {
                error!("❌ 更新{}失败: {}", E::NAME, e);
                Ok(None)
            }
        }
    }

    fn validate_column(column: &str) -> RepositoryResult<()> {
        if E::has_column(column) {
            Ok(())
        } else {
            Err(RepositoryError::unknown_column(E::NAME, column))
        }
    }

    fn validate_attributes(attributes: &Attributes) -> RepositoryResult<()> {
        attributes.keys().try_for_each(|column| Self::validate_column(column))
    }

    fn relation(name: &str) -> RepositoryResult<&'static Relation> {
        E::relation(name).ok_or_else(|| RepositoryError::unknown_relation(E::NAME, name))
    }

    /// 过滤条件加上软删除可见性
    async fn scoped_filters(&mut self, mut filters: Vec<FilterCondition>) -> RepositoryResult<Vec<FilterCondition>> {
        for filter in &filters {
            Self::validate_column(&filter.column)?;
        }

        if self.is_soft_deletable() && self.has_deletion_column().await? {
            let column = E::CAPABILITIES.deleted_at_column;
            match self.scope.trashed {
                TrashedVisibility::Exclude => filters.push(FilterCondition::is_null(column)),
                TrashedVisibility::Only => filters.push(FilterCondition::is_not_null(column)),
                TrashedVisibility::Include => {}
            }
        }
        Ok(filters)
    }

    /// 返回实体的查询在访问存储层之前先检查关联名
    async fn prepare(&mut self, filters: Vec<FilterCondition>) -> RepositoryResult<Vec<FilterCondition>> {
        for name in self.scope.with.iter().chain(&self.scope.with_count) {
            Self::relation(name)?;
        }
        self.scoped_filters(filters).await
    }

    /// 加载作用域中的关联后转换为实体
    async fn hydrate(&mut self, mut rows: Vec<Row>) -> RepositoryResult<Vec<E>> {
        if !rows.is_empty() {
            for name in self.scope.with.clone() {
                let relation = Self::relation(&name)?;
                let related = self.load_related(relation, &rows).await?;
                for row in &mut rows {
                    let mut matched = related.iter().filter(|r| is_related(relation, row, r));
                    let value = match relation.kind {
                        RelationKind::HasMany => Value::Array(matched.cloned().map(Value::Object).collect()),
                        RelationKind::BelongsTo => matched.next().cloned().map_or(Value::Null, Value::Object),
                    };
                    row.insert(relation.name.to_string(), value);
                }
            }

            for name in self.scope.with_count.clone() {
                let relation = Self::relation(&name)?;
                let related = self.load_related(relation, &rows).await?;
                for row in &mut rows {
                    let count = related.iter().filter(|r| is_related(relation, row, r)).count();
                    row.insert(relation.count_field(), Value::from(count as u64));
                }
            }
        }

        rows.into_iter().map(Self::from_row).collect()
    }

    async fn load_related(&mut self, relation: &Relation, rows: &[Row]) -> RepositoryResult<Vec<Row>> {
        let mut keys: Vec<Value> = Vec::new();
        for value in rows.iter().filter_map(|row| row.get(relation.parent_column())) {
            if !value.is_null() && !keys.contains(value) {
                keys.push(value.clone());
            }
        }
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        debug!("🔗 预加载{}.{} - 键数量: {}", E::NAME, relation.name, keys.len());
        let query = Query::table(relation.table).filters(vec![FilterCondition::in_list(relation.related_column(), keys)]);
        Ok(self.store.select(&query).await?)
    }

    fn from_row(row: Row) -> RepositoryResult<E> {
        serde_json::from_value(Value::Object(row)).map_err(|e| crate::DatabaseError::from(e).into())
    }
}

struct Cursor<'a, E: Entity, S: Store> {
    repository: &'a mut Repository<E, S>,
    filters: Vec<FilterCondition>,
    /// 上一批最后一行的主键
    after: Option<Value>,
    exhausted: bool,
}

impl<'a, E: Entity, S: Store> Cursor<'a, E, S> {
    async fn next_chunk(mut self) -> RepositoryResult<Option<(Vec<E>, Self)>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut filters = self.repository.prepare(self.filters.clone()).await?;
        if let Some(after) = &self.after {
            filters.push(FilterCondition::gt(E::PRIMARY_KEY, after.clone()));
        }

        let chunk_size = self.repository.chunk_size;
        let query = Query::table(E::TABLE)
            .filters(filters)
            .order_by(E::PRIMARY_KEY, OrderDirection::Ascending)
            .paginate(Pagination::new(0, chunk_size));
        let rows = self.repository.store.select(&query).await?;

        if rows.is_empty() {
            return Ok(None);
        }
        self.exhausted = (rows.len() as u64) < chunk_size;
        self.after = rows.last().and_then(|row| row.get(E::PRIMARY_KEY)).cloned();

        let chunk = self.repository.hydrate(rows).await?;
        Ok(Some((chunk, self)))
    }
}

fn is_related(relation: &Relation, parent: &Row, related: &Row) -> bool {
    match (parent.get(relation.parent_column()), related.get(relation.related_column())) {
        (Some(a), Some(b)) => !a.is_null() && a == b,
        _ => false,
    }
}

fn now() -> Value {
    Value::String(Utc::now().to_rfc3339())
}

fn with_creation_timestamps<E: Entity>(mut row: Attributes) -> Attributes {
    if E::CAPABILITIES.timestamps {
        for column in [CREATED_AT, UPDATED_AT] {
            if E::has_column(column) && !row.contains_key(column) {
                row.insert(column.to_string(), now());
            }
        }
    }
    row
}

/// 错误信息中的值，字符串不带引号
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
