//! 服务层模块
//!
//! 服务层包装仓库层，负责后置条件检查和批量操作的事务

pub mod crud;
pub mod error;
pub mod user;

#[cfg(test)]
pub(crate) mod testing;

pub use crud::CrudService;
pub use error::{ServiceError, ServiceResult, UnauthorizedError};
pub use user::UserService;
