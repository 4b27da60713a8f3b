//! 仓库层错误
//!
//! 错误带有HTTP风格的数字状态码，Web层直接使用它作为响应状态码。

use crate::DatabaseError;
use std::fmt;
use thiserror::Error;

/// 400 Bad Request，仓库错误的默认状态码
pub const CODE_BAD_REQUEST: u16 = 400;

/// 404 Not Found
pub const CODE_NOT_FOUND: u16 = 404;

/// 500 Internal Server Error
pub const CODE_INTERNAL: u16 = 500;

/// 仓库操作结果类型
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// 仓库错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// 传入的实体不是当前仓库绑定的实体类型
    NotAnEntityOfThisType,
    /// 记录不存在
    NotFound,
    /// 实体或数据表不支持软删除
    SoftDeleteUnsupported,
    /// 列名不属于当前实体
    UnknownColumn,
    /// 关联名不属于当前实体
    UnknownRelation,
    /// 存储层查询失败
    Query,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnEntityOfThisType => write!(f, "not_an_entity_of_this_type"),
            Self::NotFound => write!(f, "not_found"),
            Self::SoftDeleteUnsupported => write!(f, "soft_delete_unsupported"),
            Self::UnknownColumn => write!(f, "unknown_column"),
            Self::UnknownRelation => write!(f, "unknown_relation"),
            Self::Query => write!(f, "query"),
        }
    }
}

/// 仓库层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RepositoryError {
    pub kind: RepositoryErrorKind,
    /// 状态码，默认400
    pub code: u16,
    pub message: String,
}

impl RepositoryError {
    /// 使用默认状态码（400）创建错误
    pub fn new(kind: RepositoryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: CODE_BAD_REQUEST,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: u16) -> Self {
        self.code = code;
        self
    }

    pub fn not_an_entity_of(expected: &str, found: &str) -> Self {
        Self::new(
            RepositoryErrorKind::NotAnEntityOfThisType,
            format!("Model is not an entity of repository model class: expected {expected}, got {found}"),
        )
    }

    pub fn not_found(entity: &str, column: &str, key: impl fmt::Display) -> Self {
        Self::new(RepositoryErrorKind::NotFound, format!("No query results for model [{entity}] where {column} = {key}"))
            .with_code(CODE_NOT_FOUND)
    }

    pub fn soft_delete_unsupported(entity: &str) -> Self {
        Self::new(RepositoryErrorKind::SoftDeleteUnsupported, format!("Model [{entity}] does not support soft deletes"))
    }

    pub fn unknown_column(entity: &str, column: &str) -> Self {
        Self::new(RepositoryErrorKind::UnknownColumn, format!("Column [{column}] does not exist on model [{entity}]"))
    }

    pub fn unknown_relation(entity: &str, relation: &str) -> Self {
        Self::new(RepositoryErrorKind::UnknownRelation, format!("Call to undefined relationship [{relation}] on model [{entity}]"))
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == RepositoryErrorKind::NotFound
    }
}

/// 存储层错误都是查询失败，属于服务端错误
impl From<DatabaseError> for RepositoryError {
    fn from(err: DatabaseError) -> Self {
        Self::new(RepositoryErrorKind::Query, err.to_string()).with_code(CODE_INTERNAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_code_is_bad_request() {
        let err = RepositoryError::new(RepositoryErrorKind::UnknownColumn, "boom");
        assert_eq!(err.code, CODE_BAD_REQUEST);
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_not_found_error() {
        let err = RepositoryError::not_found("User", "id", 42);
        assert!(err.is_not_found());
        assert_eq!(err.code, CODE_NOT_FOUND);
        assert_eq!(err.to_string(), "No query results for model [User] where id = 42");
    }

    #[test]
    fn test_database_error_conversion() {
        let err: RepositoryError = DatabaseError::transaction("no active transaction").into();
        assert_eq!(err.kind, RepositoryErrorKind::Query);
        assert_eq!(err.code, CODE_INTERNAL);
    }
}
