//! 服务容器实现
//!
//! - 按服务标识注册工厂，首次解析时创建实例并缓存（单例 / 请求作用域）
//! - 同一服务的创建过程互斥，不同服务可并发解析
//! - 按解析链检测循环依赖；跨线程的循环通过"等待图"检测，不会互相阻塞

use super::definition_cache::{
    build_identity, DefinitionCache, DefinitionManifest, DefinitionRecord, NoDefinitionCache,
};
use super::{DuplicatePolicy, ServiceLifetime};
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::any::{Any, TypeId};
use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// 工厂返回的错误类型
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 类型擦除后的实例（内部保存 `Arc<T>`，支持 `T = dyn Trait`）
type Instance = Arc<dyn Any + Send + Sync>;

/// 没有解析链在创建该槽
const NO_BUILDER: u64 = 0;

/// 实例槽：互斥锁保证同一服务的检查-创建-写入不会交错
///
/// `builder` 记录正在执行工厂的解析链，供等待图检测使用。
pub(crate) struct InstanceSlot {
    id: ServiceId,
    instance: Mutex<Option<Instance>>,
    builder: AtomicU64,
}

impl InstanceSlot {
    fn new(id: ServiceId) -> Arc<Self> {
        Arc::new(Self {
            id,
            instance: Mutex::new(None),
            builder: AtomicU64::new(NO_BUILDER),
        })
    }
}

/// 容器错误
#[derive(Debug, Error)]
pub enum ContainerError {
    /// 服务未注册
    #[error("Service '{service}' is not registered")]
    UnknownService { service: &'static str },
    /// 重复注册（仅在 `DuplicatePolicy::Reject` 下出现）
    #[error("Service '{service}' is already registered")]
    DuplicateDefinition { service: &'static str },
    /// 循环依赖，`chain` 为完整解析链，首尾为同一服务
    #[error("Circular dependency detected in chain: {}", .chain.join(" -> "))]
    CyclicDependency { chain: Vec<&'static str> },
    /// 工厂自身失败
    #[error("Failed to create service '{service}': {source}")]
    CreationFailed {
        service: &'static str,
        #[source]
        source: BoxError,
    },
    /// 类型转换失败
    #[error("Type cast failed: expected '{expected}'")]
    TypeCastFailed { expected: &'static str },
    /// 作用域服务在没有请求作用域时被解析
    #[error("Scoped service '{service}' requested outside of a request scope")]
    NoActiveScope { service: &'static str },
    /// 单例依赖了作用域服务
    #[error("Singleton '{singleton}' cannot depend on scoped service '{scoped}'")]
    ScopeViolation {
        singleton: &'static str,
        scoped: &'static str,
    },
    /// 定义缓存读写失败
    #[error("Definition cache error: {0}")]
    DefinitionCache(#[from] super::definition_cache::DefinitionCacheError),
}

/// 服务标识：类型标签 + 类型名（用于错误信息和定义缓存）
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceId {
    type_id: TypeId,
    name: &'static str,
}

impl ServiceId {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// 服务工厂trait
pub trait ServiceFactory: Send + Sync {
    /// 创建服务实例，可通过 `resolver` 递归解析依赖
    fn create(&self, resolver: &Resolver<'_>) -> Result<Instance, ContainerError>;
}

/// 函数式服务工厂
struct FnServiceFactory<F, T: ?Sized> {
    factory_fn: F,
    _phantom: PhantomData<fn() -> Arc<T>>,
}

impl<F, T> ServiceFactory for FnServiceFactory<F, T>
where
    F: Fn(&Resolver<'_>) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    T: ?Sized + Send + Sync + 'static,
{
    fn create(&self, resolver: &Resolver<'_>) -> Result<Instance, ContainerError> {
        let service = (self.factory_fn)(resolver).map_err(|e| {
            // 依赖解析的容器错误原样向上传播，只有工厂自身的错误才包装
            match e.downcast::<ContainerError>() {
                Ok(inner) => *inner,
                Err(source) => ContainerError::CreationFailed {
                    service: std::any::type_name::<T>(),
                    source,
                },
            }
        })?;
        Ok(Arc::new(service))
    }
}

/// 服务定义
#[derive(Clone)]
struct ServiceDefinition {
    factory: Arc<dyn ServiceFactory>,
    lifetime: ServiceLifetime,
}

/// 内部容器统计信息（原子计数器）
#[derive(Default)]
struct InnerStats {
    total_resolutions: AtomicUsize,
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
}

/// 服务容器
///
/// 定义表和实例缓存分开保存，"是否注册"与"是否已解析"可以分别查询。
/// 克隆容器共享同一份状态。
#[derive(Clone)]
pub struct ServiceContainer {
    /// 服务定义注册表
    definitions: Arc<DashMap<ServiceId, ServiceDefinition>>,
    /// 单例实例缓存
    singletons: Arc<DashMap<ServiceId, Arc<InstanceSlot>>>,
    /// 解析链 id -> 正在等待的槽
    waiting: Arc<DashMap<u64, Arc<InstanceSlot>>>,
    next_chain: Arc<AtomicU64>,
    /// 解析过程中观察到的依赖边
    dependencies: Arc<DashMap<ServiceId, BTreeSet<&'static str>>>,
    /// 单例的创建完成顺序（依赖总是先于依赖者完成）
    resolution_order: Arc<Mutex<Vec<ServiceId>>>,
    policy: DuplicatePolicy,
    definition_cache: Arc<dyn DefinitionCache>,
    stats: Arc<InnerStats>,
}

impl ServiceContainer {
    /// 创建新的容器实例（允许覆盖注册，不使用定义缓存）
    pub fn new() -> Self {
        Self::with_options(DuplicatePolicy::Overwrite, Arc::new(NoDefinitionCache))
    }

    pub(crate) fn with_options(
        policy: DuplicatePolicy,
        definition_cache: Arc<dyn DefinitionCache>,
    ) -> Self {
        Self {
            definitions: Arc::new(DashMap::new()),
            singletons: Arc::new(DashMap::new()),
            waiting: Arc::new(DashMap::new()),
            next_chain: Arc::new(AtomicU64::new(NO_BUILDER + 1)),
            dependencies: Arc::new(DashMap::new()),
            resolution_order: Arc::new(Mutex::new(Vec::new())),
            policy,
            definition_cache,
            stats: Arc::new(InnerStats::default()),
        }
    }

    /// 注册服务工厂
    ///
    /// 在 `DuplicatePolicy::Overwrite` 下重复注册会整体替换旧定义（不合并），
    /// 已缓存的实例同时失效；`DuplicatePolicy::Reject` 下返回 `DuplicateDefinition`。
    pub fn register<T, F>(&self, lifetime: ServiceLifetime, factory: F) -> Result<(), ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        let id = ServiceId::of::<T>();
        if self.policy == DuplicatePolicy::Reject && self.definitions.contains_key(&id) {
            return Err(ContainerError::DuplicateDefinition { service: id.name });
        }

        let definition = ServiceDefinition {
            factory: Arc::new(FnServiceFactory::<F, T> {
                factory_fn: factory,
                _phantom: PhantomData,
            }),
            lifetime,
        };
        if self.definitions.insert(id, definition).is_some() {
            tracing::debug!(service = id.name, "Service definition overwritten");
            self.singletons.remove(&id);
        }
        Ok(())
    }

    /// 注册单例服务 - 便捷方法
    pub fn register_singleton<T, F>(&self, factory: F) -> Result<(), ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        self.register(ServiceLifetime::Singleton, factory)
    }

    /// 注册请求作用域服务 - 便捷方法
    pub fn register_scoped<T, F>(&self, factory: F) -> Result<(), ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        self.register(ServiceLifetime::Scoped, factory)
    }

    /// 注册现成的实例
    pub fn register_instance<T>(&self, instance: Arc<T>) -> Result<(), ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.register(ServiceLifetime::Singleton, move |_| Ok(instance.clone()))
    }

    /// 解析服务 - 主要API
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ContainerError> {
        Resolver::root(self, None).resolve::<T>()
    }

    /// 开启一个请求作用域
    pub fn begin_scope(&self) -> super::RequestScope {
        super::RequestScope::new(self.clone())
    }

    /// 检查服务是否已注册
    pub fn is_registered<T: ?Sized + 'static>(&self) -> bool {
        self.definitions.contains_key(&ServiceId::of::<T>())
    }

    /// 检查单例是否已创建（正在创建中视为未创建）
    pub fn is_resolved<T: ?Sized + 'static>(&self) -> bool {
        let slot = self
            .singletons
            .get(&ServiceId::of::<T>())
            .map(|entry| entry.value().clone());
        match slot {
            Some(slot) => slot
                .instance
                .try_lock()
                .map(|guard| guard.is_some())
                .unwrap_or(false),
            None => false,
        }
    }

    /// 已注册服务的名称（排序后）
    pub fn registered_services(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.definitions.iter().map(|e| e.key().name).collect();
        names.sort_unstable();
        names
    }

    /// 获取容器统计信息
    pub fn get_stats(&self) -> ContainerStats {
        ContainerStats {
            total_resolutions: self.stats.total_resolutions.load(Ordering::Relaxed),
            cache_hits: self.stats.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.stats.cache_misses.load(Ordering::Relaxed),
        }
    }

    /// 当前定义集合的构建标识
    pub fn build_identity(&self) -> String {
        build_identity(self.registered_services())
    }

    /// 当前的定义记录（名称、生命周期、已观察到的依赖）
    pub fn definition_records(&self) -> Vec<DefinitionRecord> {
        let order = self.resolution_order.lock().clone();
        let mut records: Vec<DefinitionRecord> = order
            .iter()
            .filter_map(|id| self.record_for(*id))
            .collect();

        let mut rest: Vec<DefinitionRecord> = self
            .definitions
            .iter()
            .filter(|e| !order.contains(e.key()))
            .filter_map(|e| self.record_for(*e.key()))
            .collect();
        rest.sort_by(|a, b| a.name.cmp(&b.name));
        records.extend(rest);
        records
    }

    fn record_for(&self, id: ServiceId) -> Option<DefinitionRecord> {
        let lifetime = self.definitions.get(&id)?.lifetime;
        let dependencies = self
            .dependencies
            .get(&id)
            .map(|deps| deps.iter().map(|d| d.to_string()).collect())
            .unwrap_or_default();
        Some(DefinitionRecord {
            name: id.name.to_string(),
            lifetime,
            dependencies,
        })
    }

    /// 将定义记录写入定义缓存
    pub fn persist_definitions(&self) -> Result<(), ContainerError> {
        let manifest = DefinitionManifest::new(self.build_identity(), self.definition_records());
        self.definition_cache.store(&manifest)?;
        tracing::debug!(
            build_id = %manifest.build_id,
            records = manifest.records.len(),
            "Container definitions persisted"
        );
        Ok(())
    }

    /// 按缓存中记录的顺序预先创建单例
    ///
    /// 缓存缺失或构建标识不一致时不做任何事，返回 0。
    pub fn warm_up(&self) -> Result<usize, ContainerError> {
        let build_id = self.build_identity();
        let manifest = match self.definition_cache.load(&build_id)? {
            Some(manifest) => manifest,
            None => {
                tracing::debug!(build_id = %build_id, "No cached container definitions");
                return Ok(0);
            }
        };

        let mut warmed = 0;
        for record in manifest.records.iter() {
            if record.lifetime != ServiceLifetime::Singleton {
                continue;
            }
            let id = self
                .definitions
                .iter()
                .find(|e| e.key().name == record.name && e.value().lifetime == ServiceLifetime::Singleton)
                .map(|e| *e.key());
            if let Some(id) = id {
                Resolver::root(self, None).resolve_id(id)?;
                warmed += 1;
            }
        }
        tracing::info!(build_id = %build_id, warmed, "Container warmed up from definition cache");
        Ok(warmed)
    }

    /// 依次解析全部已注册服务，返回每个服务的结果（按名称排序）
    pub(crate) fn resolve_all(
        &self,
        scope: Option<&ScopeState>,
    ) -> Vec<(&'static str, Result<(), ContainerError>)> {
        let mut ids: Vec<ServiceId> = self.definitions.iter().map(|e| *e.key()).collect();
        ids.sort_by_key(|id| id.name);
        ids.into_iter()
            .map(|id| (id.name, Resolver::root(self, scope).resolve_id(id).map(|_| ())))
            .collect()
    }

    fn definition(&self, id: ServiceId) -> Option<ServiceDefinition> {
        self.definitions.get(&id).map(|entry| entry.value().clone())
    }

    fn singleton_slot(&self, id: ServiceId) -> Arc<InstanceSlot> {
        self.singletons
            .entry(id)
            .or_insert_with(|| InstanceSlot::new(id))
            .clone()
    }

    /// 沿等待图查找：`slot` 的创建者在等谁，直到回到 `chain_id` 或断开
    ///
    /// 找到时返回经过的槽（从 `slot` 开始，最后一个由 `chain_id` 持有）。
    fn wait_cycle(&self, chain_id: u64, slot: &Arc<InstanceSlot>) -> Option<Vec<ServiceId>> {
        let mut path = Vec::new();
        let mut current = slot.clone();
        // 每条解析链最多等待一个槽，路径长度不会超过等待者数量
        for _ in 0..=self.waiting.len() {
            let builder = current.builder.load(Ordering::SeqCst);
            if builder == NO_BUILDER {
                return None;
            }
            if builder == chain_id {
                return Some(path);
            }
            let next = self.waiting.get(&builder).map(|e| e.value().clone())?;
            path.push(next.id);
            current = next;
        }
        None
    }

    fn record_dependency(&self, parent: ServiceId, child: ServiceId) {
        self.dependencies.entry(parent).or_default().insert(child.name);
    }
}

impl Default for ServiceContainer {
    fn default() -> Self {
        Self::new()
    }
}

/// 作用域内的实例缓存与预置实例
pub(crate) struct ScopeState {
    pub(crate) provided: DashMap<ServiceId, Instance>,
    pub(crate) instances: DashMap<ServiceId, Arc<InstanceSlot>>,
}

impl ScopeState {
    pub(crate) fn new() -> Self {
        Self {
            provided: DashMap::new(),
            instances: DashMap::new(),
        }
    }

    pub(crate) fn provide<T: ?Sized + Send + Sync + 'static>(&self, value: Arc<T>) {
        self.provided.insert(ServiceId::of::<T>(), Arc::new(value));
    }

    fn slot(&self, id: ServiceId) -> Arc<InstanceSlot> {
        self.instances
            .entry(id)
            .or_insert_with(|| InstanceSlot::new(id))
            .clone()
    }
}

/// 解析器：一次解析链上的句柄
///
/// 工厂通过它解析自己的依赖；它携带当前解析链，用于循环依赖检测，
/// 因此并发解析的不同链互不干扰。
pub struct Resolver<'a> {
    container: &'a ServiceContainer,
    scope: Option<&'a ScopeState>,
    chain_id: u64,
    chain: Vec<(ServiceId, ServiceLifetime)>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn root(container: &'a ServiceContainer, scope: Option<&'a ScopeState>) -> Self {
        Self {
            container,
            scope,
            chain_id: container.next_chain.fetch_add(1, Ordering::Relaxed),
            chain: Vec::new(),
        }
    }

    /// 解析依赖服务
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ContainerError> {
        let instance = self.resolve_id(ServiceId::of::<T>())?;
        instance
            .downcast_ref::<Arc<T>>()
            .cloned()
            .ok_or(ContainerError::TypeCastFailed {
                expected: std::any::type_name::<T>(),
            })
    }

    /// 解析可选服务：未注册时返回 `None`，其他错误照常返回
    pub fn resolve_optional<T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> Result<Option<Arc<T>>, ContainerError> {
        match self.resolve::<T>() {
            Ok(service) => Ok(Some(service)),
            Err(ContainerError::UnknownService { service }) if service == std::any::type_name::<T>() => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn resolve_id(&self, id: ServiceId) -> Result<Instance, ContainerError> {
        let stats = &self.container.stats;
        stats.total_resolutions.fetch_add(1, Ordering::Relaxed);

        // 检查循环依赖
        if self.chain.iter().any(|(seen, _)| *seen == id) {
            let mut chain: Vec<&'static str> = self
                .chain
                .iter()
                .skip_while(|(seen, _)| *seen != id)
                .map(|(seen, _)| seen.name)
                .collect();
            chain.push(id.name);
            return Err(ContainerError::CyclicDependency { chain });
        }

        // 单例正在创建时不能拿到任何请求级实例
        let singleton_parent = match self.chain.last() {
            Some((parent, lifetime)) => {
                self.container.record_dependency(*parent, id);
                (*lifetime == ServiceLifetime::Singleton).then_some(parent.name)
            }
            None => None,
        };

        if let Some(instance) = self
            .scope
            .and_then(|scope| scope.provided.get(&id).map(|e| e.value().clone()))
        {
            if let Some(singleton) = singleton_parent {
                return Err(ContainerError::ScopeViolation {
                    singleton,
                    scoped: id.name,
                });
            }
            stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(instance);
        }

        let definition = self
            .container
            .definition(id)
            .ok_or(ContainerError::UnknownService { service: id.name })?;

        let slot = match definition.lifetime {
            ServiceLifetime::Singleton => self.container.singleton_slot(id),
            ServiceLifetime::Scoped => {
                if let Some(singleton) = singleton_parent {
                    return Err(ContainerError::ScopeViolation {
                        singleton,
                        scoped: id.name,
                    });
                }
                self.scope
                    .ok_or(ContainerError::NoActiveScope { service: id.name })?
                    .slot(id)
            }
        };

        let mut guard = self.lock_slot(&slot)?;
        if let Some(instance) = guard.as_ref() {
            stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(instance.clone());
        }
        stats.cache_misses.fetch_add(1, Ordering::Relaxed);

        let mut chain = self.chain.clone();
        chain.push((id, definition.lifetime));
        let child = Resolver {
            container: self.container,
            scope: self.scope,
            chain_id: self.chain_id,
            chain,
        };
        slot.builder.store(self.chain_id, Ordering::SeqCst);
        let created = definition.factory.create(&child);
        slot.builder.store(NO_BUILDER, Ordering::SeqCst);
        let instance = created?;
        *guard = Some(instance.clone());
        drop(guard);

        if definition.lifetime == ServiceLifetime::Singleton {
            let mut order = self.container.resolution_order.lock();
            if !order.contains(&id) {
                order.push(id);
            }
        }
        tracing::trace!(service = id.name, lifetime = ?definition.lifetime, "Service created");
        Ok(instance)
    }

    /// 获取槽锁；若等待会与其他解析链形成环，返回 `CyclicDependency`
    ///
    /// 先登记等待再检查：两条链同时进入环时至少有一条能看到完整的环。
    fn lock_slot<'s>(
        &self,
        slot: &'s Arc<InstanceSlot>,
    ) -> Result<MutexGuard<'s, Option<Instance>>, ContainerError> {
        if let Some(guard) = slot.instance.try_lock() {
            return Ok(guard);
        }

        let waiting = &self.container.waiting;
        waiting.insert(self.chain_id, slot.clone());
        if let Some(path) = self.container.wait_cycle(self.chain_id, slot) {
            waiting.remove(&self.chain_id);
            return Err(ContainerError::CyclicDependency {
                chain: self.cross_chain(slot.id, &path),
            });
        }
        let guard = slot.instance.lock();
        waiting.remove(&self.chain_id);
        Ok(guard)
    }

    /// 拼出跨线程环：本链中从被占用的服务开始，经等待的服务回到它
    fn cross_chain(&self, waited: ServiceId, path: &[ServiceId]) -> Vec<&'static str> {
        let closing = path.last().copied().unwrap_or(waited);
        let mut chain: Vec<&'static str> = self
            .chain
            .iter()
            .skip_while(|(seen, _)| *seen != closing)
            .map(|(seen, _)| seen.name)
            .collect();
        chain.push(waited.name);
        chain.extend(path.iter().map(|id| id.name));
        chain
    }
}

/// 容器统计信息
#[derive(Debug, Clone)]
pub struct ContainerStats {
    pub total_resolutions: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
}

impl ContainerStats {
    /// 获取缓存命中率
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }
}
