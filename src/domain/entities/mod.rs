//! 领域实体
//!
//! 实体只是值对象，不包含任何操作数据库的方法。

pub mod user;

pub use user::User;

use serde_json::{Map, Value};

/// 领域模型接口
pub trait Model {
    /// 主键
    fn id(&self) -> u64;

    /// 转换为键值映射
    fn to_map(&self) -> Map<String, Value>;

    /// 转换为 JSON 字符串
    fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_map())
    }
}
