//! 接口层数据模型
//!
//! 包括请求参数、返回对象以及错误到HTTP响应的转换

pub mod common;
pub mod err;
pub mod users;
