//! 数据库操作模块
//!
//! 这个模块提供了数据库连接、迁移、实体定义以及通用的仓库层

pub mod connection;
pub mod entity;
pub mod error;
pub mod models;
pub mod query;
pub mod repositories;

pub use connection::{initialize_database, DatabasePool};
pub use entity::{AnyEntity, Attributes, Capabilities, Entity, Reference, Relation, RelationKind};
pub use error::DatabaseError;
pub use models::{Post, User};
pub use query::{FilterCondition, FilterOperator, OrderDirection, Paginated, Pagination, QueryScope, TrashedVisibility};
pub use repositories::{MemoryStore, PgStore, Repository, RepositoryError, RepositoryErrorKind, RepositoryResult, Row, Store, TableSchema};

/// 数据库操作结果类型
pub type DatabaseResult<T> = Result<T, DatabaseError>;
