//! 用户数据库模型

use crate::entity::{Capabilities, Entity, Relation};
use crate::models::Post;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 用户信息结构体
///
/// `posts` / `posts_count` 只有在 `with(["posts"])` / `with_count(["posts"])` 时才会被填充。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,

    /// 密码哈希，永远不会被序列化输出
    #[serde(default, skip_serializing)]
    pub password: String,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posts: Option<Vec<Post>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posts_count: Option<i64>,
}

impl User {
    /// 是否已被软删除
    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl Entity for User {
    type Key = i64;

    const NAME: &'static str = "User";
    const TABLE: &'static str = "users";
    const COLUMNS: &'static [&'static str] = &["id", "name", "email", "password", "created_at", "updated_at", "deleted_at"];
    const RELATIONS: &'static [Relation] = &[Relation::has_many("posts", "posts", "user_id", "id")];
    const CAPABILITIES: Capabilities = Capabilities::PLAIN.with_soft_deletes().with_timestamps();

    fn key(&self) -> i64 {
        self.id
    }
}
