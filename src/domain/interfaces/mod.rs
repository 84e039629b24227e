//! 领域层接口定义
//!
//! 外部协作者（数据库、用户仓储、模板渲染）的抽象接口，
//! 容器只关心解析出的实例满足这些接口。

use crate::domain::entities::User;
use crate::errors::{DatabaseError, RenderError, RepositoryError};
use serde_json::{Map, Value};

/// 数据库中的一行
pub type Row = Map<String, Value>;

/// 数据库连接
pub trait Connection: Send + Sync {
    /// 连接描述（不含密码）
    fn dsn(&self) -> String;

    /// 按主键 `id` 查询一行
    fn select_by_id(&self, table: &str, id: u64) -> Result<Option<Row>, DatabaseError>;

    /// 查询整张表
    fn select_all(&self, table: &str) -> Result<Vec<Row>, DatabaseError>;

    /// 插入一行
    fn insert(&self, table: &str, row: Row) -> Result<(), DatabaseError>;
}

/// 用户仓储
pub trait UserRepository: Send + Sync {
    fn find_by_id(&self, id: u64) -> Result<Option<User>, RepositoryError>;

    fn find_all(&self) -> Result<Vec<User>, RepositoryError>;
}

/// 视图渲染器
pub trait Renderer: Send + Sync {
    fn render(&self, name: &str, data: &Value) -> Result<String, RenderError>;
}
