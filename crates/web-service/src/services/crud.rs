//! 通用服务
//!
//! [`CrudService`] 包装一个仓库，大部分调用直接转发，另外负责：
//! - 后置条件检查：创建、更新或创建、删除、软删除、恢复失败时返回 [`ServiceError`]
//! - 批量操作：`create_many` / `delete_many` 在一个事务中执行，任何一步失败都整体回滚

use crate::models::common::PageQuery;
use crate::services::error::{ServiceError, ServiceResult};
use database::{Attributes, Entity, FilterCondition, Paginated, Reference, Repository, Store, TrashedVisibility};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use tracing::{debug, error, info};

/// 通用服务
///
/// 通过构造函数注入仓库：
///
/// ```rust,ignore
/// let mut users = CrudService::new(Repository::<User, _>::new(store.clone()));
/// let user = users.with(["posts"]).find_or_fail(1, None).await?;
/// ```
#[derive(Debug)]
pub struct CrudService<E: Entity, S: Store> {
    repository: Repository<E, S>,
}

impl<E: Entity, S: Store> CrudService<E, S> {
    pub fn new(repository: Repository<E, S>) -> Self {
        Self { repository }
    }

    pub fn repository(&mut self) -> &mut Repository<E, S> {
        &mut self.repository
    }

    pub fn with<I>(&mut self, relations: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.repository.with(relations);
        self
    }

    pub fn with_count<I>(&mut self, relations: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.repository.with_count(relations);
        self
    }

    pub fn with_trashed(&mut self) -> &mut Self {
        self.repository.with_trashed();
        self
    }

    pub fn only_trashed(&mut self) -> &mut Self {
        self.repository.only_trashed();
        self
    }

    pub fn without_trashed(&mut self) -> &mut Self {
        self.repository.without_trashed();
        self
    }

    /// 按枚举值设置软删除可见性
    pub fn trashed(&mut self, visibility: TrashedVisibility) -> &mut Self {
        match visibility {
            TrashedVisibility::Exclude => self.without_trashed(),
            TrashedVisibility::Include => self.with_trashed(),
            TrashedVisibility::Only => self.only_trashed(),
        }
    }

    pub async fn resolve_model(&mut self, reference: Reference<E>) -> ServiceResult<E> {
        Ok(self.repository.resolve_model(reference).await?)
    }

    /// 分页查询
    ///
    /// `page_size` 是调用方给出的默认值，请求中带了 `page_size` 时以请求为准。
    pub async fn get_all_paginated(&mut self, filters: Vec<FilterCondition>, page_size: u64, request: &PageQuery) -> ServiceResult<Paginated<E>> {
        let page_size = request.page_size.unwrap_or(page_size);
        let page = request.page.unwrap_or(1);
        Ok(self.repository.get_all_paginated(filters, page_size, page).await?)
    }

    pub async fn get_all(&mut self, filters: Vec<FilterCondition>) -> ServiceResult<Vec<E>> {
        Ok(self.repository.get_all(filters).await?)
    }

    pub fn get_all_as_cursor(&mut self, filters: Vec<FilterCondition>) -> BoxStream<'_, ServiceResult<E>> {
        self.repository.get_all_as_cursor(filters).map_err(ServiceError::from).boxed()
    }

    pub async fn count(&mut self, filters: Vec<FilterCondition>) -> ServiceResult<u64> {
        Ok(self.repository.count(filters).await?)
    }

    pub async fn find_or_fail(&mut self, key: impl Into<serde_json::Value>, column: Option<&str>) -> ServiceResult<E> {
        Ok(self.repository.find_or_fail(key, column).await?)
    }

    /// 按属性相等查询
    pub async fn find(&mut self, attributes: Attributes) -> ServiceResult<Vec<E>> {
        Ok(self.repository.find_many(attributes).await?)
    }

    pub async fn create(&mut self, data: Attributes) -> ServiceResult<E> {
        self.repository.create(data).await?.ok_or(ServiceError::CreateFailed)
    }

    /// 在一个事务中逐条创建
    ///
    /// # 错误处理
    /// - 输入为空时直接返回 [`ServiceError::EmptyInput`]，不访问存储层
    /// - 任何一条创建失败都会回滚整个批次
    pub async fn create_many(&mut self, items: Vec<Attributes>) -> ServiceResult<Vec<E>> {
        if items.is_empty() {
            return Err(ServiceError::EmptyInput);
        }

        info!("📦 批量创建{} - 数量: {}", E::NAME, items.len());
        self.repository.begin_transaction().await?;
        let result = self.create_each(items).await;
        self.finish_transaction(result).await
    }

    async fn create_each(&mut self, items: Vec<Attributes>) -> ServiceResult<Vec<E>> {
        let mut created = Vec::with_capacity(items.len());
        for data in items {
            created.push(self.create(data).await?);
        }
        Ok(created)
    }

    pub async fn insert(&mut self, rows: Vec<Attributes>) -> ServiceResult<bool> {
        Ok(self.repository.insert(rows).await?)
    }

    pub async fn update_or_create(&mut self, attributes: Attributes, data: Attributes) -> ServiceResult<E> {
        self.repository
            .update_or_create(attributes, data)
            .await?
            .ok_or(ServiceError::UpdateOrCreateFailed)
    }

    pub async fn update(&mut self, reference: Reference<E>, data: Attributes) -> ServiceResult<Option<E>> {
        Ok(self.repository.update(reference, data).await?)
    }

    pub async fn delete(&mut self, reference: Reference<E>) -> ServiceResult<()> {
        if self.repository.delete(reference).await? {
            Ok(())
        } else {
            Err(ServiceError::DeleteFailed)
        }
    }

    /// 在一个事务中逐条删除，任何一条失败都会回滚全部删除
    pub async fn delete_many(&mut self, references: Vec<Reference<E>>) -> ServiceResult<()> {
        info!("📦 批量删除{} - 数量: {}", E::NAME, references.len());
        self.repository.begin_transaction().await?;
        let result = self.delete_each(references).await;
        self.finish_transaction(result).await
    }

    async fn delete_each(&mut self, references: Vec<Reference<E>>) -> ServiceResult<()> {
        for reference in references {
            self.delete(reference).await?;
        }
        Ok(())
    }

    pub async fn soft_delete(&mut self, reference: Reference<E>) -> ServiceResult<()> {
        if self.repository.soft_delete(reference).await? {
            Ok(())
        } else {
            Err(ServiceError::SoftDeleteFailed)
        }
    }

    pub async fn restore(&mut self, reference: Reference<E>) -> ServiceResult<()> {
        if self.repository.restore(reference).await? {
            Ok(())
        } else {
            Err(ServiceError::RestoreFailed)
        }
    }

    /// 成功时提交，失败时回滚并返回原始错误
    async fn finish_transaction<T>(&mut self, result: ServiceResult<T>) -> ServiceResult<T> {
        match result {
            Ok(value) => {
                self.repository.commit_transaction().await?;
                debug!("✅ {}批量操作已提交", E::NAME);
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.repository.rollback_transaction().await {
                    error!("❌ 回滚事务失败: {}", rollback_err);
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::RecordingStore;
    use database::{MemoryStore, RepositoryErrorKind, User};
    use serde_json::{json, Value};

    fn attrs(value: Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    fn user_data(name: &str) -> Attributes {
        attrs(json!({"name": name, "email": format!("{name}@example.com"), "password": "hashed"}))
    }

    fn service(store: &MemoryStore) -> CrudService<User, MemoryStore> {
        CrudService::new(Repository::new(store.clone()))
    }

    #[tokio::test]
    async fn test_create_many_rejects_empty_input() {
        let store = MemoryStore::with_default_schema();
        let mut users = service(&store);

        let err = users.create_many(vec![]).await.unwrap_err();
        assert_eq!(err, ServiceError::EmptyInput);
        assert_eq!(err.to_string(), "Data is empty");
        assert_eq!(users.count(vec![]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_many_commits_batch() {
        let store = MemoryStore::with_default_schema();
        let mut users = service(&store);

        let created = users.create_many(vec![user_data("a"), user_data("b")]).await.unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(service(&store).count(vec![]).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_create_many_rolls_back_on_failure() {
        let store = MemoryStore::with_default_schema();
        let mut users = service(&store);

        // 第三条邮箱重复，存储层失败
        let err = users
            .create_many(vec![user_data("a"), user_data("b"), user_data("a")])
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::CreateFailed);
        assert_eq!(service(&store).count(vec![]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_many_stops_at_first_failure() {
        let store = MemoryStore::with_default_schema();
        service(&store).create(user_data("b")).await.unwrap();

        let recording = RecordingStore::new(store.clone());
        let mut users = CrudService::<User, _>::new(Repository::new(recording.clone()));
        let before = recording.inserts();

        // b 的邮箱已存在，c 不会再被尝试
        let err = users
            .create_many(vec![user_data("a"), user_data("b"), user_data("c")])
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::CreateFailed);
        assert_eq!(recording.inserts() - before, 2);

        let remaining = service(&store).get_all(vec![]).await.unwrap();
        assert_eq!(remaining.iter().map(|u| u.name.as_str()).collect::<Vec<_>>(), ["b"]);
    }

    #[tokio::test]
    async fn test_delete_many_rolls_back_on_failure() {
        let store = MemoryStore::with_default_schema();
        let mut users = service(&store);
        let created = users.create_many(vec![user_data("a"), user_data("b")]).await.unwrap();

        let references = vec![Reference::key(created[0].id), Reference::key(999), Reference::key(created[1].id)];
        let err = users.delete_many(references).await.unwrap_err();
        assert!(matches!(err, ServiceError::Repository(ref e) if e.kind == RepositoryErrorKind::NotFound));
        assert_eq!(err.code(), 404);
        assert_eq!(service(&store).count(vec![]).await.unwrap(), 2);

        let references = created.into_iter().map(Reference::from).collect();
        users.delete_many(references).await.unwrap();
        assert_eq!(service(&store).with_trashed().count(vec![]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_failure_is_service_error() {
        let store = MemoryStore::with_default_schema();
        let mut users = service(&store);
        users.create(user_data("a")).await.unwrap();

        assert_eq!(users.create(user_data("a")).await.unwrap_err(), ServiceError::CreateFailed);
        assert_eq!(users.count(vec![]).await.unwrap(), 1);

        let err = users.create(attrs(json!({"email": "nameless@example.com"}))).await.unwrap_err();
        assert_eq!(err, ServiceError::CreateFailed);
        assert_eq!(users.count(vec![]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_or_create_fails_when_create_fails() {
        let store = MemoryStore::with_default_schema();
        let mut users = service(&store);

        // 没有匹配的记录，合并后的属性缺少 name
        let err = users
            .update_or_create(attrs(json!({"email": "a@example.com"})), attrs(json!({"password": "x"})))
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::UpdateOrCreateFailed);
        assert_eq!(users.with_trashed().count(vec![]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_soft_delete_and_restore_failures() {
        let store = MemoryStore::with_default_schema();
        let created = service(&store).create(user_data("a")).await.unwrap();

        let recording = RecordingStore::new(store.clone());
        recording.fail_updates();
        let mut users = CrudService::<User, _>::new(Repository::new(recording));

        let err = users.soft_delete(Reference::key(created.id)).await.unwrap_err();
        assert_eq!(err, ServiceError::SoftDeleteFailed);
        let err = users.restore(Reference::key(created.id)).await.unwrap_err();
        assert_eq!(err, ServiceError::RestoreFailed);
        assert_eq!(users.update(Reference::key(created.id), user_data("z")).await.unwrap(), None);

        assert_eq!(service(&store).count(vec![]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_repository_errors_propagate_unchanged() {
        let store = MemoryStore::with_default_schema();
        let mut users = service(&store);

        let err = users.find_or_fail(1, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Repository(ref e) if e.is_not_found()));

        let err = users.create(attrs(json!({"nickname": "x"}))).await.unwrap_err();
        assert!(matches!(err, ServiceError::Repository(ref e) if e.kind == RepositoryErrorKind::UnknownColumn));
    }

    #[tokio::test]
    async fn test_update_or_create_and_find() {
        let store = MemoryStore::with_default_schema();
        let mut users = service(&store);

        let created = users
            .update_or_create(attrs(json!({"email": "a@example.com"})), attrs(json!({"name": "A"})))
            .await
            .unwrap();
        let updated = users
            .update_or_create(attrs(json!({"email": "a@example.com"})), attrs(json!({"name": "B"})))
            .await
            .unwrap();
        assert_eq!(created.id, updated.id);

        let found = users.find(attrs(json!({"name": "B"}))).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_page_size_from_request_overrides_default() {
        let store = MemoryStore::with_default_schema();
        let mut users = service(&store);
        users
            .create_many(["a", "b", "c", "d"].into_iter().map(user_data).collect())
            .await
            .unwrap();

        let page = users.get_all_paginated(vec![], 3, &PageQuery::default()).await.unwrap();
        assert_eq!(page.per_page, 3);
        assert_eq!(page.data.len(), 3);

        let request = PageQuery {
            page: Some(2),
            page_size: Some(2),
        };
        let page = users.get_all_paginated(vec![], 3, &request).await.unwrap();
        assert_eq!(page.per_page, 2);
        assert_eq!(page.current_page, 2);
        assert_eq!(page.data.iter().map(|u| u.name.as_str()).collect::<Vec<_>>(), ["c", "d"]);
    }

    #[tokio::test]
    async fn test_cursor_and_soft_delete_forwarding() {
        let store = MemoryStore::with_default_schema();
        let mut users = service(&store);
        let created = users.create_many(vec![user_data("a"), user_data("b")]).await.unwrap();

        users.soft_delete(Reference::key(created[0].id)).await.unwrap();
        let listed: Vec<User> = users.get_all_as_cursor(vec![]).try_collect().await.unwrap();
        assert_eq!(listed.len(), 1);

        users.restore(Reference::key(created[0].id)).await.unwrap();
        assert_eq!(users.get_all(vec![]).await.unwrap().len(), 2);
    }
}
