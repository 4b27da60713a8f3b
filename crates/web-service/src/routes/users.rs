//! 用户相关接口
//!
//! 所有handler都对存储引擎泛型，每个请求从 [`AppState`] 创建自己的服务实例，
//! 查询作用域不会跨请求泄漏。

use crate::models::common::{CountReply, PageQuery, Reply, ReplyList};
use crate::models::err::AppError;
use crate::models::users::{BatchDeleteRequest, BatchRegisterRequest, CountQuery, RegisterRequest, UserInfo, UserSearch, UserUpdate};
use crate::services::ServiceError;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use database::{Reference, Store};
use tracing::{debug, instrument};
use validator::Validate;

/// 根据查询参数搜索用户
///
/// 搜索条件由请求体 [`UserSearch`] 决定，分页参数放在查询字符串中：
///
/// - `page`: 页码，默认第1页
/// - `page_size`: 每页大小，覆盖服务端默认值（`DEFAULT_PAGE_SIZE`）
#[utoipa::path(post,
    path = "/search-users",
    tag = "users",
    params(PageQuery),
    request_body = UserSearch,
    responses(
        (status = 200, description = "Search results", body = ReplyList<UserInfo>)
    ),
)]
#[instrument(skip(state))]
pub async fn find_users<S: Store + Clone>(
    State(state): State<AppState<S>>,
    Query(page): Query<PageQuery>,
    Json(search): Json<UserSearch>,
) -> Result<Json<ReplyList<UserInfo>>, AppError> {
    debug!("🔍 搜索用户 {:#?}", search);

    // 验证输入参数，确保有效性
    page.validate()?;

    let mut users = state.users();
    users.trashed(search.trashed);
    if search.with_posts {
        users.with(["posts"]).with_count(["posts"]);
    }

    let result = users.get_all_paginated(search.filters(), state.default_page_size, &page).await?;

    Ok(Json(ReplyList::from_page(result)))
}

/// 注册用户
///
/// 验证失败（包括邮箱已被使用）时返回422
#[utoipa::path(post,
    path = "/users",
    tag = "users",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Registered user", body = Reply<UserInfo>),
        (status = 422, description = "Validation failed")
    )
)]
#[instrument(skip(state, request), fields(email = %request.email))]
pub async fn create_user<S: Store + Clone>(
    State(state): State<AppState<S>>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<Reply<UserInfo>>, AppError> {
    request.validate_unique(&mut state.users()).await?;

    let user = state.users().create(request.into_attributes()?).await?;

    Ok(Json(Reply { data: user.into() }))
}

/// 批量注册用户
///
/// 所有用户在一个事务中创建，任何一个失败都不会写入
#[utoipa::path(post,
    path = "/users/batch",
    tag = "users",
    request_body = BatchRegisterRequest,
    responses(
        (status = 200, description = "Registered users", body = Reply<Vec<UserInfo>>)
    )
)]
#[instrument(skip_all, fields(count = batch.users.len()))]
pub async fn create_users<S: Store + Clone>(
    State(state): State<AppState<S>>,
    Json(batch): Json<BatchRegisterRequest>,
) -> Result<Json<Reply<Vec<UserInfo>>>, AppError> {
    let mut items = Vec::with_capacity(batch.users.len());
    for request in batch.users {
        request.validate_unique(&mut state.users()).await?;
        items.push(request.into_attributes()?);
    }

    let users = state.users().create_many(items).await?;

    Ok(Json(Reply {
        data: users.into_iter().map(Into::into).collect(),
    }))
}

/// 统计用户数量
#[utoipa::path(get,
    path = "/users/count",
    tag = "users",
    params(CountQuery),
    responses(
        (status = 200, description = "User count", body = CountReply)
    )
)]
pub async fn count_users<S: Store + Clone>(State(state): State<AppState<S>>, Query(query): Query<CountQuery>) -> Result<Json<CountReply>, AppError> {
    let count = state.users().trashed(query.trashed).count(vec![]).await?;

    Ok(Json(CountReply { count }))
}

/// 查询指定用户信息，包含文章列表和文章数量
#[utoipa::path(get,
    path = "/users/{id}",
    tag = "users",
    responses(
        (status = 200, description = "User info", body = Reply<UserInfo>),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user<S: Store + Clone>(State(state): State<AppState<S>>, Path(id): Path<i64>) -> Result<Json<Reply<UserInfo>>, AppError> {
    debug!("Getting user id {}", id);

    let user = state.users().with(["posts"]).with_count(["posts"]).find_or_fail(id, None).await?;

    Ok(Json(Reply { data: user.into() }))
}

/// 更新用户信息
///
/// 根据用户指定的 `id` 和 修改信息 [`UserUpdate`] 来更新用户信息，已软删除的用户也可以更新。
#[utoipa::path(patch,
    path = "/users/{id}",
    tag = "users",
    request_body = UserUpdate,
    responses(
        (status = 200, description = "Updated user", body = Reply<UserInfo>),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn update_user<S: Store + Clone>(
    State(state): State<AppState<S>>,
    Path(id): Path<i64>,
    Json(info): Json<UserUpdate>,
) -> Result<Json<Reply<UserInfo>>, AppError> {
    debug!("Updating user {} with {:#?}", id, info);

    info.validate_unique(id, &mut state.users()).await?;

    let user = state
        .users()
        .update(Reference::key(id), info.into_attributes())
        .await?
        .ok_or(ServiceError::UpdateFailed)?;

    Ok(Json(Reply { data: user.into() }))
}

/// 物理删除指定用户
#[utoipa::path(delete,
    path = "/users/{id}",
    tag = "users",
    responses(
        (status = 204, description = "User deleted")
    )
)]
pub async fn delete_user<S: Store + Clone>(State(state): State<AppState<S>>, Path(id): Path<i64>) -> Result<StatusCode, AppError> {
    debug!("delete user {}", id);

    state.users().delete(Reference::key(id)).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// 批量删除用户，任何一个失败都会回滚全部删除
#[utoipa::path(delete,
    path = "/users",
    tag = "users",
    request_body = BatchDeleteRequest,
    responses(
        (status = 204, description = "Users deleted")
    )
)]
pub async fn delete_users<S: Store + Clone>(State(state): State<AppState<S>>, Json(batch): Json<BatchDeleteRequest>) -> Result<StatusCode, AppError> {
    debug!("delete users {:?}", batch.ids);

    let references = batch.ids.into_iter().map(|id| Reference::key(id)).collect();
    state.users().delete_many(references).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// 软删除指定用户
#[utoipa::path(post,
    path = "/users/{id}/trash",
    tag = "users",
    responses(
        (status = 200, description = "Trashed user", body = Reply<UserInfo>)
    )
)]
pub async fn trash_user<S: Store + Clone>(State(state): State<AppState<S>>, Path(id): Path<i64>) -> Result<Json<Reply<UserInfo>>, AppError> {
    let mut users = state.users();
    users.soft_delete(Reference::key(id)).await?;
    let user = users.resolve_model(Reference::key(id)).await?;

    Ok(Json(Reply { data: user.into() }))
}

/// 恢复已软删除的用户
#[utoipa::path(post,
    path = "/users/{id}/restore",
    tag = "users",
    responses(
        (status = 200, description = "Restored user", body = Reply<UserInfo>)
    )
)]
pub async fn restore_user<S: Store + Clone>(State(state): State<AppState<S>>, Path(id): Path<i64>) -> Result<Json<Reply<UserInfo>>, AppError> {
    let mut users = state.users();
    users.restore(Reference::key(id)).await?;
    let user = users.resolve_model(Reference::key(id)).await?;

    Ok(Json(Reply { data: user.into() }))
}
