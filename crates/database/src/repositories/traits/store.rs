//! 存储层 trait 定义
//!
//! 定义仓库层访问底层存储引擎的抽象接口

use crate::entity::Attributes;
use crate::query::{FilterCondition, Query};
use crate::{DatabaseError, DatabaseResult};
use serde_json::Value;

/// 存储层中的一行数据，`列名 => 值`
pub type Row = Attributes;

/// 批量插入的每一行必须有相同的列
pub fn ensure_uniform_columns(table: &str, rows: &[Row]) -> DatabaseResult<()> {
    let Some(first) = rows.first() else {
        return Ok(());
    };
    let mismatched = rows
        .iter()
        .position(|row| row.len() != first.len() || !first.keys().all(|c| row.contains_key(c)));
    match mismatched {
        Some(index) => Err(DatabaseError::ColumnMismatch {
            table: table.to_string(),
            index,
        }),
        None => Ok(()),
    }
}

/// 存储引擎trait定义
///
/// 仓库层是它唯一的调用者，需要存储引擎支持：
/// - 按列过滤、排序、偏移量分页
/// - 计数
/// - 插入/批量插入/更新/删除
/// - 检查表结构中是否存在某一列（软删除列检查）
/// - 带回滚的事务，嵌套调用时使用保存点
///
/// 方法都使用 `&mut self`：一个存储句柄同一时间只服务一条调用链，事务状态保存在句柄上。
#[async_trait::async_trait]
pub trait Store: Send + Sync + 'static {
    /// 查询满足条件的行
    ///
    /// # 参数
    /// - `query`: 表名、过滤条件、排序和分页
    ///
    /// # 返回值
    /// 返回所有匹配的行
    async fn select(&mut self, query: &Query) -> DatabaseResult<Vec<Row>>;

    /// 统计满足条件的行数
    async fn count(&mut self, table: &str, filters: &[FilterCondition]) -> DatabaseResult<u64>;

    /// 插入一行并返回插入后的完整数据（包含自增主键、默认值）
    async fn insert(&mut self, table: &str, row: Row) -> DatabaseResult<Row>;

    /// 批量插入，不返回数据
    ///
    /// 所有行的列必须一致（见 [`ensure_uniform_columns`]），否则整批拒绝
    ///
    /// # 返回值
    /// 返回插入的行数
    async fn insert_many(&mut self, table: &str, rows: Vec<Row>) -> DatabaseResult<u64>;

    /// 按主键更新部分列
    ///
    /// # 返回值
    /// 返回更新后的行，记录不存在时返回 `None`
    async fn update(&mut self, table: &str, key_column: &str, key: &Value, changes: Row) -> DatabaseResult<Option<Row>>;

    /// 按主键物理删除
    ///
    /// # 返回值
    /// 返回删除的行数
    async fn delete(&mut self, table: &str, key_column: &str, key: &Value) -> DatabaseResult<u64>;

    /// 表结构中是否存在指定列
    async fn has_column(&mut self, table: &str, column: &str) -> DatabaseResult<bool>;

    /// 开启事务，已在事务中时创建保存点
    async fn begin(&mut self) -> DatabaseResult<()>;

    /// 提交最内层事务
    async fn commit(&mut self) -> DatabaseResult<()>;

    /// 回滚最内层事务
    async fn rollback(&mut self) -> DatabaseResult<()>;

    /// 当前事务嵌套层数，0表示不在事务中
    fn transaction_depth(&self) -> usize;
}
