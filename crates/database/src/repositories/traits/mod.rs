//! 存储层 trait 定义
//!
//! 这里定义了仓库层依赖的存储引擎抽象接口 [`Store`]
//!
//! ## Store Trait 设计模式 🎯
//!
//! 仓库 [`crate::Repository`] 是一个泛型结构体，对实体类型和存储引擎都是泛型的：
//!
//! ```rust,ignore
//! pub struct Repository<E: Entity, S: Store> { /* ... */ }
//! ```
//!
//! 存储引擎需要满足以下 trait 约束：
//!
//! ```rust,ignore
//! pub trait Store: Send + Sync + 'static {
//!     // 异步方法定义...
//! }
//! ```
//!
//! ### Trait 约束说明 📚
//!
//! #### `Send` trait 🚀
//! - **作用**：表示类型可以安全地在线程间转移所有权
//! - **必要性**：异步方法返回的 `Future` 需要在不同线程间传递
//! - **场景**：Web 服务器中，不同的请求可能在不同线程处理
//!
//! #### `Sync` trait 🔄
//! - **作用**：表示类型可以安全地在多个线程间共享引用
//! - **必要性**：仓库和服务被放进 axum 的 handler 中，需要满足 `Sync`
//!
//! #### `'static` 生命周期 ⏰
//! - **作用**：表示类型不包含非静态引用，可以在程序整个生命周期中存活
//! - **必要性**：`async_trait` 生成的 `Future` 需要 `'static` 约束的类型
//!
//! #### 为什么不要求 `Clone` 📋
//!
//! 存储句柄上保存着事务状态，克隆一个正在事务中的句柄没有意义。需要"每个请求一个句柄"
//! 的地方（例如 Web 层的 `AppState`）单独加上 `Clone` 约束，实现者的 `clone` 语义是
//! "拿到一个新的、不在事务中的句柄"，例如 [`crate::PgStore`] 只克隆连接池。
//!
//! ### 实际应用场景 💡
//!
//! ```rust,ignore
//! // 1. Policy Based Design - 使用泛型而非 trait object
//! #[derive(Clone)]
//! struct AppState<S: Store + Clone> {
//!     store: S,
//! }
//!
//! // 2. 每个请求创建自己的仓库/服务，查询作用域不会跨请求泄漏
//! async fn get_user<S: Store + Clone>(
//!     State(state): State<AppState<S>>,
//!     Path(id): Path<i64>,
//! ) -> Result<Json<User>, AppError> {
//!     let mut users = UserService::new(Repository::new(state.store.clone()));
//!     Ok(Json(users.with(["posts"]).find_or_fail(id, None).await?))
//! }
//!
//! // 3. 线上使用 PostgreSQL，测试使用内存存储
//! let app_state = AppState { store: PgStore::new(pool.clone()) };
//! let test_state = AppState { store: MemoryStore::with_default_schema() };
//! ```
//!
//! ### 最佳实践 ✅
//!
//! 1. **异步优先**：所有存储操作方法都应该是异步的
//! 2. **错误处理**：使用统一的 `DatabaseResult<T>` 类型进行错误处理
//! 3. **接口简洁**：存储层只处理"表 + 行"，实体、作用域和软删除语义都在仓库层

pub mod store;

// 重新导出
pub use store::{ensure_uniform_columns, Row, Store};
