//! 数据库模型模块
//!
//! 这里定义与数据库表对应的结构体以及它们的实体声明

pub mod post;
pub mod user;

// 重新导出具体的模型
pub use post::Post;
pub use user::User;
