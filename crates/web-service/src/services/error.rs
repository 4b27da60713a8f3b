//! 服务层错误
//!
//! 服务层在仓库错误之外增加后置条件错误，仓库错误原样透传。

use database::RepositoryError;
use thiserror::Error;

/// 服务层自身错误的状态码
pub const SERVICE_ERROR_CODE: u16 = 400;

/// 未授权错误的状态码
pub const UNAUTHORIZED_CODE: u16 = 401;

/// 服务层操作结果类型
pub type ServiceResult<T> = Result<T, ServiceError>;

/// 服务层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// 仓库层错误，原样透传
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// 批量操作的输入为空
    #[error("Data is empty")]
    EmptyInput,

    #[error("Error while creating model")]
    CreateFailed,

    #[error("Error while creating or updating the model")]
    UpdateOrCreateFailed,

    #[error("Error while updating model")]
    UpdateFailed,

    #[error("Error while deleting model")]
    DeleteFailed,

    #[error("Error while soft deleting model")]
    SoftDeleteFailed,

    #[error("Error while restoring model")]
    RestoreFailed,
}

impl ServiceError {
    /// 错误对应的状态码，仓库错误使用它自己的状态码
    pub fn code(&self) -> u16 {
        match self {
            Self::Repository(err) => err.code,
            _ => SERVICE_ERROR_CODE,
        }
    }
}

/// 已认证但没有权限
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct UnauthorizedError {
    pub message: String,
}

impl UnauthorizedError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn code(&self) -> u16 {
        UNAUTHORIZED_CODE
    }
}

impl Default for UnauthorizedError {
    fn default() -> Self {
        Self::new("No have authorized")
    }
}
