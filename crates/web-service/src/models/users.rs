//! 用户接口的请求和返回对象

use crate::models::err::AppError;
use crate::services::{user::hash_password, UserService};
use chrono::{DateTime, Utc};
use color_eyre::Result;
use database::{Attributes, FilterCondition, Post, Store, TrashedVisibility, User};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError, ValidationErrors};

/// 用户注册信息
///
/// 缺少的字段按空字符串处理，由验证规则给出错误信息
#[derive(Deserialize, Debug, Clone, ToSchema, Validate)]
pub struct RegisterRequest {
    #[schema(example = "Alice")]
    #[serde(default)]
    #[validate(length(min = 1, message = "The name field is required."))]
    pub name: String,

    #[schema(example = "alice@example.com")]
    #[serde(default)]
    #[validate(email(message = "The email field must be a valid email address."))]
    pub email: String,

    #[schema(example = "password123")]
    #[serde(default)]
    #[validate(length(min = 8, message = "The password field must be at least 8 characters."))]
    pub password: String,

    #[schema(example = "password123")]
    #[serde(default)]
    #[validate(must_match(other = "password", message = "The password confirmation does not match."))]
    pub password_confirmation: String,
}

impl RegisterRequest {
    /// 字段规则校验加上邮箱唯一性校验（已软删除的用户也算）
    ///
    /// `users` 的可见性会被修改，调用方应该传入单独的服务实例。
    pub async fn validate_unique<S: Store>(&self, users: &mut UserService<S>) -> Result<(), AppError> {
        let mut errors = self.validate().err().unwrap_or_default();

        if !self.email.is_empty() && users.email_taken(&self.email, None).await? {
            errors.add("email", email_taken_error());
        }

        into_result(errors)
    }

    /// 转换为数据库属性，密码会被哈希
    pub fn into_attributes(self) -> Result<Attributes> {
        let mut attributes = Attributes::new();
        attributes.insert("name".to_string(), Value::String(self.name));
        attributes.insert("email".to_string(), Value::String(self.email));
        attributes.insert("password".to_string(), Value::String(hash_password(&self.password)?));
        Ok(attributes)
    }
}

fn email_taken_error() -> ValidationError {
    ValidationError::new("unique").with_message("The email has already been taken.".into())
}

fn into_result(errors: ValidationErrors) -> Result<(), AppError> {
    if errors.errors().is_empty() {
        Ok(())
    } else {
        Err(errors.into())
    }
}

/// 批量注册
#[derive(Deserialize, Debug, ToSchema)]
pub struct BatchRegisterRequest {
    pub users: Vec<RegisterRequest>,
}

/// 用户更新信息，只更新传入的字段
#[derive(Deserialize, Debug, Default, ToSchema, Validate)]
pub struct UserUpdate {
    #[schema(example = "Alicia")]
    #[validate(length(min = 1, message = "The name field is required."))]
    pub name: Option<String>,

    #[schema(example = "alicia@example.com")]
    #[validate(email(message = "The email field must be a valid email address."))]
    pub email: Option<String>,
}

impl UserUpdate {
    /// 字段规则校验加上邮箱唯一性校验，用户 `id` 自己的邮箱不算冲突
    pub async fn validate_unique<S: Store>(&self, id: i64, users: &mut UserService<S>) -> Result<(), AppError> {
        let mut errors = self.validate().err().unwrap_or_default();

        if let Some(email) = self.email.as_deref().filter(|e| !e.is_empty()) {
            if users.email_taken(email, Some(id)).await? {
                errors.add("email", email_taken_error());
            }
        }

        into_result(errors)
    }

    pub fn into_attributes(self) -> Attributes {
        let mut attributes = Attributes::new();
        if let Some(name) = self.name {
            attributes.insert("name".to_string(), Value::String(name));
        }
        if let Some(email) = self.email {
            attributes.insert("email".to_string(), Value::String(email));
        }
        attributes
    }
}

/// 用户搜索条件
#[derive(Deserialize, Debug, Default, ToSchema)]
pub struct UserSearch {
    /// 用户名，模糊搜索
    #[schema(example = "Ali")]
    pub name: Option<String>,

    /// 邮箱，精确匹配
    pub email: Option<String>,

    /// 已软删除用户的可见性，默认不包含
    #[serde(default)]
    #[schema(value_type = String, example = "exclude")]
    pub trashed: TrashedVisibility,

    /// 是否返回每个用户的文章列表和文章数量
    #[serde(default)]
    pub with_posts: bool,
}

impl UserSearch {
    pub fn filters(&self) -> Vec<FilterCondition> {
        let mut filters = Vec::new();
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            filters.push(FilterCondition::like("name", format!("%{name}%")));
        }
        if let Some(email) = &self.email {
            filters.push(FilterCondition::eq("email", email.as_str()));
        }
        filters
    }
}

/// 计数条件
#[derive(Deserialize, Debug, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CountQuery {
    /// 已软删除用户的可见性：`exclude` / `include` / `only`
    #[serde(default)]
    #[param(value_type = Option<String>, example = "include")]
    pub trashed: TrashedVisibility,
}

/// 批量删除
#[derive(Deserialize, Debug, ToSchema)]
pub struct BatchDeleteRequest {
    #[schema(example = json!([1, 2, 3]))]
    pub ids: Vec<i64>,
}

/// 文章信息
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct PostInfo {
    pub id: i64,
    pub title: String,
    pub body: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<Post> for PostInfo {
    fn from(post: Post) -> Self {
        Self {
            id: post.id,
            title: post.title,
            body: post.body,
            created_at: post.created_at,
        }
    }
}

/// 返回给调用方的用户信息，不包含密码
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct UserInfo {
    #[schema(example = 1)]
    pub id: i64,
    #[schema(example = "Alice")]
    pub name: String,
    #[schema(example = "alice@example.com")]
    pub email: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub posts: Option<Vec<PostInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posts_count: Option<i64>,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            created_at: user.created_at,
            updated_at: user.updated_at,
            deleted_at: user.deleted_at,
            posts: user.posts.map(|posts| posts.into_iter().map(Into::into).collect()),
            posts_count: user.posts_count,
        }
    }
}
