use crate::services::{ServiceError, UnauthorizedError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use color_eyre::eyre::Error;
use database::RepositoryError;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{error, warn};
use validator::ValidationErrors;

/// 使用 [`thiserror`] 定义错误类型
/// 方便根据类型转换为相应的http错误码
#[derive(Error, Debug)]
pub enum AppError {
    /// 数据验证错误，这种错误通常都是用户参数不正确导致的，转换为422
    #[error(transparent)]
    ValidationFailed(#[from] ValidationErrors),

    /// 仓库层错误
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// 服务层错误，里面可能包着仓库层错误
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// 没有登录
    #[error("Unauthenticated.")]
    Unauthenticated,

    /// 已登录但没有权限
    #[error(transparent)]
    Unauthorized(#[from] UnauthorizedError),

    /// 其他类型错误
    #[error(transparent)]
    InternalError(#[from] Error),
}

/// 错误响应体
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// 字段 → 错误信息，只有验证失败时才有
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, Vec<String>>>,
}

impl AppError {
    /// 错误到 `(状态码, type)` 的转换表
    pub fn dispatch(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::ValidationFailed(_) => (StatusCode::UNPROCESSABLE_ENTITY, "Validation"),
            AppError::Repository(err) | AppError::Service(ServiceError::Repository(err)) => repository_dispatch(err),
            AppError::Service(err) => (status(err.code()), "Service"),
            AppError::Unauthenticated => (StatusCode::UNAUTHORIZED, "Authorized"),
            AppError::Unauthorized(err) => (status(err.code()), "Unauthorized"),
            AppError::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Error"),
        }
    }

    fn body(&self) -> ErrorBody {
        let (message, errors) = match self {
            AppError::ValidationFailed(errors) => ("The given data was invalid.".to_string(), Some(field_errors(errors))),
            // 内部错误的细节只记录日志，不返回给调用方
            AppError::InternalError(_) => ("Something went wrong".to_string(), None),
            other => (other.to_string(), None),
        };

        ErrorBody {
            message,
            kind: self.dispatch().1,
            errors,
        }
    }
}

fn repository_dispatch(err: &RepositoryError) -> (StatusCode, &'static str) {
    if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Exception")
    } else {
        (status(err.code), "Repository")
    }
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn field_errors(errors: &ValidationErrors) -> BTreeMap<String, Vec<String>> {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errors)| {
            let messages = errors
                .iter()
                .map(|e| e.message.as_ref().map_or_else(|| e.code.to_string(), ToString::to_string))
                .collect();
            (field.to_string(), messages)
        })
        .collect()
}

/// Tell axum how to convert `AppError` into a response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind) = self.dispatch();
        if status.is_server_error() {
            error!("❌ [{}] {:?}", kind, self);
        } else {
            warn!("⚠️ [{}] {}", kind, self);
        }

        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use color_eyre::eyre::eyre;
    use database::RepositoryErrorKind;
    use serde_json::{json, Value};
    use validator::ValidationError;

    async fn respond(err: AppError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_not_found_maps_to_exception() {
        let err = ServiceError::from(RepositoryError::not_found("User", "id", 9));
        let (status, body) = respond(err.into()).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"message": "No query results for model [User] where id = 9", "type": "Exception"}));
    }

    #[tokio::test]
    async fn test_repository_error_uses_its_code() {
        let err = RepositoryError::new(RepositoryErrorKind::UnknownColumn, "bad column");
        let (status, body) = respond(AppError::Service(err.clone().into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["type"], "Repository");

        let (status, _) = respond(err.with_code(409).into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_service_and_auth_errors() {
        let (status, body) = respond(ServiceError::DeleteFailed.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"message": "Error while deleting model", "type": "Service"}));

        let (status, body) = respond(UnauthorizedError::default().into()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"message": "No have authorized", "type": "Unauthorized"}));

        let (status, body) = respond(AppError::Unauthenticated).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["type"], "Authorized");
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let (status, body) = respond(eyre!("connection refused").into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"message": "Something went wrong", "type": "Error"}));
    }

    #[tokio::test]
    async fn test_validation_errors_are_listed_by_field() {
        let mut errors = ValidationErrors::new();
        errors.add("email", ValidationError::new("unique").with_message("The email has already been taken.".into()));
        errors.add("password", ValidationError::new("length"));

        let (status, body) = respond(errors.into()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["type"], "Validation");
        assert_eq!(body["errors"]["email"], json!(["The email has already been taken."]));
        assert_eq!(body["errors"]["password"], json!(["length"]));
    }
}
