//! 数据库仓库模块
//!
//! 这里定义数据库操作的Repository层：通用仓库 [`Repository`]、存储引擎抽象 [`Store`]
//! 以及它的两个实现 [`PgStore`] / [`MemoryStore`]

pub mod base;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod traits;

// 重新导出具体的类型
pub use base::{Repository, DEFAULT_CHUNK_SIZE};
pub use error::{RepositoryError, RepositoryErrorKind, RepositoryResult};
pub use memory::{MemoryStore, TableSchema};
pub use postgres::PgStore;
pub use traits::{Row, Store};
