//! 实体定义
//!
//! 每个数据表对应一个实现了 [`Entity`] 的结构体。表名、主键、可用的列、关联关系以及
//! 软删除等能力都通过关联常量静态声明，仓库层只查这张"能力表"，不做任何运行时反射。

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt::{self, Debug, Display};

/// 列名 → 值，用于创建、更新和条件查询
pub type Attributes = Map<String, Value>;

/// 默认的软删除时间戳列名
pub const DELETED_AT: &str = "deleted_at";

/// 默认的创建时间列名
pub const CREATED_AT: &str = "created_at";

/// 默认的更新时间列名
pub const UPDATED_AT: &str = "updated_at";

/// 实体的能力描述
///
/// 在实体注册（实现 [`Entity`]）时静态声明。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// 是否支持软删除
    pub soft_deletes: bool,

    /// 软删除时间戳列名
    pub deleted_at_column: &'static str,

    /// 是否由仓库维护 `created_at` / `updated_at`
    pub timestamps: bool,
}

impl Capabilities {
    /// 没有任何附加能力的普通实体
    pub const PLAIN: Self = Self {
        soft_deletes: false,
        deleted_at_column: DELETED_AT,
        timestamps: false,
    };

    /// 开启软删除
    #[must_use]
    pub const fn with_soft_deletes(self) -> Self {
        Self {
            soft_deletes: true,
            ..self
        }
    }

    /// 使用自定义列名的软删除
    #[must_use]
    pub const fn with_soft_deletes_on(self, column: &'static str) -> Self {
        Self {
            soft_deletes: true,
            deleted_at_column: column,
            ..self
        }
    }

    /// 开启时间戳维护
    #[must_use]
    pub const fn with_timestamps(self) -> Self {
        Self {
            timestamps: true,
            ..self
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::PLAIN
    }
}

/// 关联关系类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// 一对多：`related.foreign_key = parent.local_key`
    HasMany,
    /// 从属：`parent.foreign_key = related.owner_key`
    BelongsTo,
}

/// 实体之间的关联关系，供 `with` / `with_count` 预加载使用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    /// 关联名，加载后作为返回对象中的字段名
    pub name: &'static str,
    /// 关联表
    pub table: &'static str,
    pub kind: RelationKind,
    /// 外键列
    pub foreign_key: &'static str,
    /// HasMany 时为父表列，BelongsTo 时为关联表列
    pub local_key: &'static str,
}

impl Relation {
    pub const fn has_many(name: &'static str, table: &'static str, foreign_key: &'static str, local_key: &'static str) -> Self {
        Self {
            name,
            table,
            kind: RelationKind::HasMany,
            foreign_key,
            local_key,
        }
    }

    pub const fn belongs_to(name: &'static str, table: &'static str, foreign_key: &'static str, owner_key: &'static str) -> Self {
        Self {
            name,
            table,
            kind: RelationKind::BelongsTo,
            foreign_key,
            local_key: owner_key,
        }
    }

    /// 父实体上用于匹配的列
    pub fn parent_column(&self) -> &'static str {
        match self.kind {
            RelationKind::HasMany => self.local_key,
            RelationKind::BelongsTo => self.foreign_key,
        }
    }

    /// 关联实体上用于匹配的列
    pub fn related_column(&self) -> &'static str {
        match self.kind {
            RelationKind::HasMany => self.foreign_key,
            RelationKind::BelongsTo => self.local_key,
        }
    }

    /// `with_count` 加载后的字段名
    pub fn count_field(&self) -> String {
        format!("{}_count", self.name)
    }
}

/// 持久化实体
///
/// 存储层以 JSON 对象的形式读写行数据，实体通过 `serde` 与之互相转换，
/// 所以预加载的关联数据也可以直接反序列化到实体的可选字段上。
pub trait Entity: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {
    /// 主键类型
    type Key: Into<Value> + Clone + Debug + Display + Send + Sync + 'static;

    /// 实体名，用于错误信息
    const NAME: &'static str;

    /// 表名，可以带schema，例如 `hm.users`
    const TABLE: &'static str;

    /// 主键列名
    const PRIMARY_KEY: &'static str = "id";

    /// 可以读写和过滤的列
    const COLUMNS: &'static [&'static str];

    /// 可预加载的关联关系
    const RELATIONS: &'static [Relation] = &[];

    /// 能力描述
    const CAPABILITIES: Capabilities = Capabilities::PLAIN;

    /// 当前实体的主键值
    fn key(&self) -> Self::Key;

    /// 列是否属于当前实体
    fn has_column(column: &str) -> bool {
        Self::COLUMNS.contains(&column)
    }

    /// 按名称查找关联关系
    fn relation(name: &str) -> Option<&'static Relation> {
        Self::RELATIONS.iter().find(|r| r.name == name)
    }
}

/// 类型擦除后的实体，可以装任意 [`Entity`]
///
/// 仓库在解析 [`Reference::Entity`] 时会检查它是不是自己绑定的实体类型。
pub struct AnyEntity {
    name: &'static str,
    inner: Box<dyn Any + Send + Sync>,
}

impl AnyEntity {
    pub fn new<E: Entity>(entity: E) -> Self {
        Self {
            name: E::NAME,
            inner: Box::new(entity),
        }
    }

    /// 实际装着的实体名
    pub fn entity_name(&self) -> &'static str {
        self.name
    }

    /// 转换回具体的实体类型，类型不匹配时原样返回
    pub fn downcast<E: Entity>(self) -> Result<E, Self> {
        let name = self.name;
        self.inner.downcast::<E>().map(|e| *e).map_err(|inner| Self { name, inner })
    }
}

impl Debug for AnyEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyEntity").field("name", &self.name).finish_non_exhaustive()
    }
}

/// 主键或者已经加载好的实体
///
/// 所有按"单条记录"操作的接口都同时接受这两种形式。
#[derive(Debug)]
pub enum Reference<E: Entity> {
    Key(E::Key),
    Entity(AnyEntity),
}

impl<E: Entity> Reference<E> {
    pub fn key(key: impl Into<E::Key>) -> Self {
        Self::Key(key.into())
    }

    /// 任意实体的引用，类型在仓库解析时才检查
    pub fn entity<T: Entity>(entity: T) -> Self {
        Self::Entity(AnyEntity::new(entity))
    }
}

impl<E: Entity> From<E> for Reference<E> {
    fn from(entity: E) -> Self {
        Self::entity(entity)
    }
}
