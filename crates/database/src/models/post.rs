//! 文章数据库模型

use crate::entity::{Capabilities, Entity, Relation};
use crate::models::User;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 文章信息结构体，不支持软删除
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Box<User>>,
}

impl Entity for Post {
    type Key = i64;

    const NAME: &'static str = "Post";
    const TABLE: &'static str = "posts";
    const COLUMNS: &'static [&'static str] = &["id", "user_id", "title", "body", "created_at", "updated_at"];
    const RELATIONS: &'static [Relation] = &[Relation::belongs_to("user", "users", "user_id", "id")];
    const CAPABILITIES: Capabilities = Capabilities::PLAIN.with_timestamps();

    fn key(&self) -> i64 {
        self.id
    }
}
