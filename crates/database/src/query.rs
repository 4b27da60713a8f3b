//! 查询相关类型
//!
//! 包括过滤条件、排序、分页以及仓库实例上的查询作用域（预加载/软删除可见性）。

use crate::entity::Attributes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// 排序方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Ascending,
    Descending,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "ASC"),
            Self::Descending => write!(f, "DESC"),
        }
    }
}

/// 偏移量分页参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// 跳过的记录数
    pub offset: u64,
    /// 最多返回的记录数
    pub limit: u64,
}

impl Pagination {
    #[must_use]
    pub const fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    /// 按页码（从1开始）计算分页参数
    #[must_use]
    pub const fn page(page_number: u64, page_size: u64) -> Self {
        // saturating_sub(1)会保证结果>=0，不会出现溢出
        let offset = page_number.saturating_sub(1).saturating_mul(page_size);
        Self {
            offset,
            limit: page_size,
        }
    }
}

/// 过滤条件的比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterThanOrEqual,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessThanOrEqual,
    Like,
    In,
    IsNull,
    IsNotNull,
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "="),
            Self::NotEqual => write!(f, "<>"),
            Self::GreaterThan => write!(f, ">"),
            Self::GreaterThanOrEqual => write!(f, ">="),
            Self::LessThan => write!(f, "<"),
            Self::LessThanOrEqual => write!(f, "<="),
            Self::Like => write!(f, "LIKE"),
            Self::In => write!(f, "IN"),
            Self::IsNull => write!(f, "IS NULL"),
            Self::IsNotNull => write!(f, "IS NOT NULL"),
        }
    }
}

/// 单个过滤条件：`column operator value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub column: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: Value,
}

impl FilterCondition {
    pub fn new(column: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOperator::Equal, value)
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOperator::NotEqual, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOperator::GreaterThan, value)
    }

    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOperator::GreaterThanOrEqual, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOperator::LessThan, value)
    }

    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOperator::LessThanOrEqual, value)
    }

    /// SQL `LIKE`，支持 `%` 和 `_` 通配符
    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(column, FilterOperator::Like, Value::String(pattern.into()))
    }

    pub fn in_list<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        Self::new(column, FilterOperator::In, Value::Array(values))
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::new(column, FilterOperator::IsNull, Value::Null)
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self::new(column, FilterOperator::IsNotNull, Value::Null)
    }

    /// 把 `列 => 值` 转换为一组相等条件
    pub fn from_attributes(attributes: &Attributes) -> Vec<Self> {
        attributes.iter().map(|(column, value)| Self::eq(column.clone(), value.clone())).collect()
    }
}

/// 软删除记录的可见性，三者互斥
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrashedVisibility {
    /// 排除已软删除的记录（默认）
    #[default]
    Exclude,
    /// 包含已软删除的记录
    Include,
    /// 只查已软删除的记录
    Only,
}

/// 仓库实例上的查询作用域
///
/// 每个仓库实例独立持有，随实例创建和销毁，不跨请求共享。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryScope {
    /// 需要预加载的关联
    pub with: Vec<String>,
    /// 需要统计数量的关联
    pub with_count: Vec<String>,
    pub trashed: TrashedVisibility,
}

/// 交给存储层执行的单表查询
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub filters: Vec<FilterCondition>,
    pub order_by: Option<(String, OrderDirection)>,
    pub pagination: Option<Pagination>,
}

impl Query {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filters: Vec::new(),
            order_by: None,
            pagination: None,
        }
    }

    #[must_use]
    pub fn filters(mut self, filters: Vec<FilterCondition>) -> Self {
        self.filters = filters;
        self
    }

    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by = Some((column.into(), direction));
        self
    }

    #[must_use]
    pub fn paginate(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }
}

/// 带总数的分页结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    /// 满足条件的记录总数
    pub total: u64,
    pub per_page: u64,
    pub current_page: u64,
    pub last_page: u64,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, total: u64, per_page: u64, current_page: u64) -> Self {
        let last_page = if per_page == 0 { 1 } else { total.div_ceil(per_page).max(1) };
        Self {
            data,
            total,
            per_page,
            current_page,
            last_page,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            data: self.data.into_iter().map(f).collect(),
            total: self.total,
            per_page: self.per_page,
            current_page: self.current_page,
            last_page: self.last_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pagination_page() {
        assert_eq!(Pagination::page(1, 20), Pagination::new(0, 20));
        assert_eq!(Pagination::page(3, 20), Pagination::new(40, 20));
        // 页码0按第一页处理
        assert_eq!(Pagination::page(0, 20), Pagination::new(0, 20));
    }

    #[test]
    fn test_paginated_last_page() {
        let page = Paginated::new(vec![1, 2, 3], 31, 15, 1);
        assert_eq!(page.last_page, 3);

        let empty: Paginated<i32> = Paginated::new(vec![], 0, 15, 1);
        assert_eq!(empty.last_page, 1);

        let mapped = page.map(|n| n * 10);
        assert_eq!(mapped.data, vec![10, 20, 30]);
        assert_eq!(mapped.total, 31);
    }

    #[test]
    fn test_filters_from_attributes() {
        let attributes = json!({"name": "A", "email": "a@x.com"});
        let filters = FilterCondition::from_attributes(attributes.as_object().unwrap());

        assert_eq!(filters.len(), 2);
        assert!(filters.contains(&FilterCondition::eq("name", "A")));
        assert!(filters.iter().all(|f| f.operator == FilterOperator::Equal));
    }

    #[test]
    fn test_filter_condition_deserialize() {
        let filter: FilterCondition = serde_json::from_value(json!({"column": "name", "operator": "like", "value": "A%"})).unwrap();
        assert_eq!(filter, FilterCondition::like("name", "A%"));

        let filter: FilterCondition = serde_json::from_value(json!({"column": "deleted_at", "operator": "is_null"})).unwrap();
        assert_eq!(filter, FilterCondition::is_null("deleted_at"));

        let filter: FilterCondition = serde_json::from_value(json!({"column": "id", "operator": ">=", "value": 3})).unwrap();
        assert_eq!(filter, FilterCondition::gte("id", 3));
    }

    #[test]
    fn test_trashed_visibility_default() {
        assert_eq!(QueryScope::default().trashed, TrashedVisibility::Exclude);
    }
}
