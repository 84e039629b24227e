//! Container module

pub mod definition_cache;
pub mod service_container;

pub use definition_cache::{
    DefinitionCache, DefinitionCacheError, DefinitionManifest, DefinitionRecord,
    FileDefinitionCache, NoDefinitionCache,
};
pub use service_container::{
    BoxError, ContainerError, ContainerStats, Resolver, ServiceContainer, ServiceId,
};

use crate::config::{Environment, Settings};
use serde::{Deserialize, Serialize};
use service_container::ScopeState;
use std::sync::Arc;

/// 服务生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceLifetime {
    /// 容器生命周期内只创建一次
    Singleton,
    /// 每个请求作用域创建一次
    Scoped,
}

/// 重复注册策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// 覆盖旧定义（便于测试替身）
    #[default]
    Overwrite,
    /// 拒绝重复注册
    Reject,
}

/// 请求作用域
///
/// 与根容器共享服务定义和单例缓存，作用域服务在这里单独缓存。
/// 每个入站请求一个作用域，请求结束时随之释放。
pub struct RequestScope {
    id: uuid::Uuid,
    container: ServiceContainer,
    state: ScopeState,
}

impl RequestScope {
    pub(crate) fn new(container: ServiceContainer) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            container,
            state: ScopeState::new(),
        }
    }

    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    pub fn container(&self) -> &ServiceContainer {
        &self.container
    }

    /// 预置请求级实例（优先于注册的工厂）
    pub fn provide<T: ?Sized + Send + Sync + 'static>(&self, value: Arc<T>) {
        self.state.provide(value);
    }

    /// 在作用域内解析服务
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ContainerError> {
        Resolver::root(&self.container, Some(&self.state)).resolve::<T>()
    }

    /// 在作用域内解析全部已注册服务，用于启动自检
    pub fn resolve_all(&self) -> Vec<(&'static str, Result<(), ContainerError>)> {
        self.container.resolve_all(Some(&self.state))
    }
}

/// 容器构建器
#[derive(Default)]
pub struct ContainerBuilder {
    policy: DuplicatePolicy,
    definition_cache: Option<Arc<dyn DefinitionCache>>,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按配置选择定义缓存：非开发环境使用 `{temp}/container-cache`
    pub fn from_settings(settings: &Settings) -> Self {
        let builder = Self::new();
        match settings.environment() {
            Environment::Development => builder,
            Environment::Deployed(_) => builder.definition_cache(Arc::new(FileDefinitionCache::new(
                settings.temp.join("container-cache"),
            ))),
        }
    }

    pub fn duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn definition_cache(mut self, cache: Arc<dyn DefinitionCache>) -> Self {
        self.definition_cache = Some(cache);
        self
    }

    pub fn build(self) -> ServiceContainer {
        let cache = self
            .definition_cache
            .unwrap_or_else(|| Arc::new(NoDefinitionCache));
        ServiceContainer::with_options(self.policy, cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RequestCounter {
        value: usize,
    }

    struct Connection;

    struct RequestMarker(&'static str);

    #[test]
    fn test_scoped_instances_are_per_scope() {
        let container = ContainerBuilder::new().build();
        let created = Arc::new(AtomicUsize::new(0));
        let created_clone = created.clone();
        container
            .register_scoped(move |_| {
                Ok(Arc::new(RequestCounter {
                    value: created_clone.fetch_add(1, Ordering::SeqCst),
                }))
            })
            .unwrap();

        let first = container.begin_scope();
        let a1 = first.resolve::<RequestCounter>().unwrap();
        let a2 = first.resolve::<RequestCounter>().unwrap();
        assert!(Arc::ptr_eq(&a1, &a2));

        let second = container.begin_scope();
        let b = second.resolve::<RequestCounter>().unwrap();
        assert!(!Arc::ptr_eq(&a1, &b));
        assert_eq!(b.value, 1);
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn test_singletons_shared_across_scopes() {
        let container = ContainerBuilder::new().build();
        container.register_singleton(|_| Ok(Arc::new(Connection))).unwrap();

        let from_first = container.begin_scope().resolve::<Connection>().unwrap();
        let from_second = container.begin_scope().resolve::<Connection>().unwrap();
        let from_root = container.resolve::<Connection>().unwrap();

        assert!(Arc::ptr_eq(&from_first, &from_second));
        assert!(Arc::ptr_eq(&from_first, &from_root));
    }

    #[test]
    fn test_provided_instance_overrides_factory() {
        let container = ContainerBuilder::new().build();
        container
            .register_scoped(|_| Ok(Arc::new(RequestMarker("default"))))
            .unwrap();

        let scope = container.begin_scope();
        scope.provide(Arc::new(RequestMarker("from-request")));
        assert_eq!(scope.resolve::<RequestMarker>().unwrap().0, "from-request");

        let other = container.begin_scope();
        assert_eq!(other.resolve::<RequestMarker>().unwrap().0, "default");
    }

    #[test]
    fn test_builder_duplicate_policy() {
        let container = ContainerBuilder::new()
            .duplicate_policy(DuplicatePolicy::Reject)
            .build();
        container.register_singleton(|_| Ok(Arc::new(Connection))).unwrap();
        assert!(container
            .register_singleton(|_| Ok(Arc::new(Connection)))
            .is_err());
    }
}
