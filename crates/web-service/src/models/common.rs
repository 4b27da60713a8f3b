use database::Paginated;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// 分页查询信息
///
/// 所有参数都是可选的，缺省时使用第1页和服务端配置的默认每页大小
#[derive(Deserialize, Debug, Default, Clone, Copy, ToSchema, IntoParams, Validate)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    #[schema(example = 1)]
    #[validate(range(min = 1))]
    /// 分页查询的开始页数
    pub page: Option<u64>,

    #[schema(example = 15)]
    #[validate(range(min = 1))]
    /// 分页查询的每页大小，覆盖服务端默认值
    pub page_size: Option<u64>,
}

/// 封装符合json-api的单个返回对象
///
/// 具体参考：<https://jsonapi.org>
#[derive(Deserialize, Debug, ToSchema, Serialize)]
pub struct Reply<T> {
    pub data: T,
}

/// 封装符合json-api的列表对象
#[derive(Deserialize, Debug, ToSchema, Serialize)]
pub struct ReplyList<T> {
    pub data: Vec<T>,
    #[schema(example = 146)]
    /// 分页查询总数
    pub total: u64,

    #[schema(example = 15)]
    /// 分页查询的每页大小
    pub per_page: u64,

    #[schema(example = 1)]
    /// 当前页数
    pub current_page: u64,

    #[schema(example = 10)]
    /// 最后一页的页数
    pub last_page: u64,
}

impl<T> ReplyList<T> {
    /// 把分页结果转换为返回对象
    pub fn from_page<E>(page: Paginated<E>) -> Self
    where
        T: From<E>,
    {
        let page = page.map(T::from);
        Self {
            data: page.data,
            total: page.total,
            per_page: page.per_page,
            current_page: page.current_page,
            last_page: page.last_page,
        }
    }
}

/// 计数结果
#[derive(Deserialize, Debug, ToSchema, Serialize)]
pub struct CountReply {
    #[schema(example = 42)]
    pub count: u64,
}
