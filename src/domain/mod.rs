//! 领域层
//!
//! 包含领域模型和外部协作者的抽象接口：
//! - 领域实体（用户）
//! - 数据库连接、用户仓储、视图渲染接口

pub mod entities;
pub mod interfaces;

pub use entities::{Model, User};
pub use interfaces::{Connection, Renderer, Row, UserRepository};
