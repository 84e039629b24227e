//! 基础设施层
//!
//! 提供具体的技术实现，包括：
//! - 依赖注入容器
//! - 服务注册
//! - 数据库连接与用户仓储
//! - 模板渲染与路由

// 容器实现
pub mod container;

pub mod database;
pub mod provider;
pub mod renderer;
pub mod repository;
pub mod router;

// 重新导出API
pub use container::{ContainerBuilder, ContainerError, RequestScope, ServiceContainer, ServiceLifetime};
pub use provider::ProviderFactory;
