//! 用户服务
//!
//! 用户服务就是绑定了 [`User`] 的通用服务，另外提供密码哈希

use crate::services::crud::CrudService;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::Argon2;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use database::{FilterCondition, Store, User};

use super::error::ServiceResult;

/// 用户服务
pub type UserService<S> = CrudService<User, S>;

/// 使用 Argon2id 生成密码哈希（PHC字符串格式）
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| eyre!("密码哈希失败: {e}"))
}

/// 校验密码，哈希格式不正确时返回错误
#[cfg(test)]
pub(crate) fn verify_password(password: &str, hash: &str) -> Result<bool> {
    use argon2::password_hash::{PasswordHash, PasswordVerifier};

    let parsed = PasswordHash::new(hash).map_err(|e| eyre!("密码哈希格式错误: {e}"))?;
    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

impl<S: Store> CrudService<User, S> {
    /// 邮箱是否已被使用，已软删除的用户也算
    ///
    /// `except` 为正在更新的用户，它自己的邮箱不算冲突。
    /// 会把当前服务的可见性切换为包含已软删除，所以最好在单独的服务实例上调用。
    pub async fn email_taken(&mut self, email: &str, except: Option<i64>) -> ServiceResult<bool> {
        let mut filters = vec![FilterCondition::eq("email", email)];
        if let Some(id) = except {
            filters.push(FilterCondition::ne("id", id));
        }
        let count = self.with_trashed().count(filters).await?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use database::{MemoryStore, Repository};
    use serde_json::json;

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("password123").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert_ne!(hash, hash_password("password123").unwrap(), "每次的盐都不同");

        assert!(verify_password("password123", &hash).unwrap());
        assert!(!verify_password("wrong-password", &hash).unwrap());
        assert!(verify_password("password123", "not-a-hash").is_err());
    }

    #[tokio::test]
    async fn test_email_taken_includes_trashed_users() {
        let store = MemoryStore::with_default_schema();
        let mut users: UserService<_> = CrudService::new(Repository::new(store.clone()));
        let data = json!({"name": "A", "email": "a@example.com", "password": "x"});
        let user = users.create(data.as_object().cloned().unwrap()).await.unwrap();
        let user_id = user.id;
        users.soft_delete(user.into()).await.unwrap();

        let mut checker: UserService<_> = CrudService::new(Repository::new(store.clone()));
        assert!(checker.email_taken("a@example.com", None).await.unwrap());
        assert!(!checker.email_taken("b@example.com", None).await.unwrap());
        assert!(!checker.email_taken("a@example.com", Some(user_id)).await.unwrap());
        assert!(checker.email_taken("a@example.com", Some(user_id + 1)).await.unwrap());
    }
}
