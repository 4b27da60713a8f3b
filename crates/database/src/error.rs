use thiserror::Error;

/// 数据库操作错误类型
///
/// 这是存储层（[`crate::Store`]）的错误，仓库层会把它转换为 [`crate::RepositoryError`]
/// 或者记录日志后转换为 `None`/`false`。
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLX 错误
    #[error("数据库操作错误: {0}")]
    SqlxError(#[from] sqlx::Error),

    /// 连接错误
    #[error("数据库连接错误: {0}")]
    ConnectionError(String),

    /// 迁移错误
    #[error("数据库迁移错误: {0}")]
    MigrationError(String),

    /// 行数据无法转换为实体
    #[error("数据序列化错误: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// 非法的表名或列名，拒绝拼接到SQL中
    #[error("非法的标识符: {0}")]
    InvalidIdentifier(String),

    /// 唯一约束冲突
    #[error("唯一约束冲突: {table}.{column} = {value}")]
    UniqueViolation {
        table: String,
        column: String,
        value: String,
    },

    /// 非空约束冲突
    #[error("非空约束冲突: {table}.{column} 不能为 NULL")]
    NotNullViolation { table: String, column: String },

    /// 批量插入时某一行的列与第一行不同
    #[error("批量插入 {table} 的第 {index} 行与第一行的列不一致")]
    ColumnMismatch { table: String, index: usize },

    /// 表不存在
    #[error("数据表不存在: {0}")]
    UnknownTable(String),

    /// 事务状态错误（例如没有开启事务就提交）
    #[error("事务错误: {0}")]
    TransactionError(String),
}

impl DatabaseError {
    /// 创建连接错误
    pub fn connection<T: ToString>(msg: T) -> Self {
        Self::ConnectionError(msg.to_string())
    }

    /// 创建迁移错误
    pub fn migration<T: ToString>(msg: T) -> Self {
        Self::MigrationError(msg.to_string())
    }

    /// 创建事务错误
    pub fn transaction<T: ToString>(msg: T) -> Self {
        Self::TransactionError(msg.to_string())
    }
}
