//! 服务提供者实现
//!
//! 根据配置和运行模式向容器注册应用的全部服务。
//! 运行模式由入口显式传入，决定会话使用内存实现还是 cookie 持久实现。

use super::container::{ContainerError, Resolver, ServiceContainer};
use super::database::MemoryConnection;
use super::renderer::TemplateRenderer;
use super::repository::{DbUserRepository, USERS_TABLE};
use super::router::Router;
use crate::auth::AuthService;
use crate::config::{RuntimeMode, Settings};
use crate::domain::{Connection, Renderer, UserRepository};
use crate::i18n::{CatalogStore, Locale, TomlCatalogLoader, Translator, LANGUAGE_SESSION_KEY};
use crate::logging::Logger;
use crate::security::CsrfGuard;
use crate::session::{
    InMemorySessionBackend, PersistentSessionAdapter, SessionBackend, SessionCookie, SessionStore,
};
use crate::errors::RenderError;
use serde_json::{json, Value};
use std::sync::Arc;

/// 服务提供者工厂
pub struct ProviderFactory {
    settings: Arc<Settings>,
    mode: RuntimeMode,
    session_backend: Arc<dyn SessionBackend>,
}

impl ProviderFactory {
    pub fn new(settings: Arc<Settings>, mode: RuntimeMode) -> Self {
        let session_backend = Arc::new(InMemorySessionBackend::from_options(&settings.session));
        Self {
            settings,
            mode,
            session_backend,
        }
    }

    /// 替换持久会话的存储后端
    pub fn with_session_backend(mut self, backend: Arc<dyn SessionBackend>) -> Self {
        self.session_backend = backend;
        self
    }

    pub fn mode(&self) -> RuntimeMode {
        self.mode
    }

    /// 注册所有默认服务
    pub fn register_default_providers(&self, container: &ServiceContainer) -> Result<(), ContainerError> {
        self.register_core(container)?;
        self.register_persistence(container)?;
        self.register_session(container)?;
        self.register_i18n(container)?;
        self.register_web(container)?;

        tracing::debug!(
            mode = ?self.mode,
            services = container.registered_services().len(),
            "Default providers registered"
        );
        Ok(())
    }

    fn register_core(&self, container: &ServiceContainer) -> Result<(), ContainerError> {
        container.register_instance(self.settings.clone())?;

        container.register_singleton(|r: &Resolver<'_>| {
            let settings = r.resolve::<Settings>()?;
            Ok(Arc::new(Logger::new(settings.logger.name.clone())))
        })?;

        container.register_singleton(|r: &Resolver<'_>| {
            let settings = r.resolve::<Settings>()?;
            Ok(Arc::new(Router::new(&settings.router.base_path)))
        })?;
        Ok(())
    }

    fn register_persistence(&self, container: &ServiceContainer) -> Result<(), ContainerError> {
        container.register_singleton(|r: &Resolver<'_>| {
            let settings = r.resolve::<Settings>()?;
            let connection = MemoryConnection::connect(&settings.db);
            connection.create_table(USERS_TABLE);
            let connection: Arc<dyn Connection> = Arc::new(connection);
            Ok(connection)
        })?;

        container.register_singleton(|r: &Resolver<'_>| {
            let db = r.resolve::<dyn Connection>()?;
            let users: Arc<dyn UserRepository> = Arc::new(DbUserRepository::new(db));
            Ok(users)
        })?;
        Ok(())
    }

    fn register_session(&self, container: &ServiceContainer) -> Result<(), ContainerError> {
        container.register_instance(self.session_backend.clone())?;

        let mode = self.mode;
        container.register_scoped(move |r: &Resolver<'_>| {
            let settings = r.resolve::<Settings>()?;
            let options = settings.session.clone();
            let session = match mode {
                RuntimeMode::Cli => SessionStore::memory(options),
                RuntimeMode::Server => {
                    let backend = r.resolve::<dyn SessionBackend>()?;
                    let cookie = r
                        .resolve_optional::<SessionCookie>()?
                        .map(|cookie| (*cookie).clone())
                        .unwrap_or_default();
                    let adapter = PersistentSessionAdapter::open(backend, &cookie)?;
                    SessionStore::new(Box::new(adapter), options)
                }
            };
            Ok(Arc::new(session))
        })?;

        container.register_scoped(|r: &Resolver<'_>| {
            let settings = r.resolve::<Settings>()?;
            let session = r.resolve::<SessionStore>()?;
            Ok(Arc::new(CsrfGuard::new(session, &settings.csrf)))
        })?;

        container.register_scoped(|r: &Resolver<'_>| {
            let session = r.resolve::<SessionStore>()?;
            let users = r.resolve::<dyn UserRepository>()?;
            Ok(Arc::new(AuthService::new(session, users)))
        })?;
        Ok(())
    }

    fn register_i18n(&self, container: &ServiceContainer) -> Result<(), ContainerError> {
        container.register_singleton(|r: &Resolver<'_>| {
            let settings = r.resolve::<Settings>()?;
            let loader = TomlCatalogLoader::new(settings.locale.path.clone())
                .with_cache(settings.locale.cache.clone());
            Ok(Arc::new(CatalogStore::new(Box::new(loader))))
        })?;

        container.register_scoped(|r: &Resolver<'_>| {
            let settings = r.resolve::<Settings>()?;
            let store = r.resolve::<CatalogStore>()?;
            let session = r.resolve::<SessionStore>()?;
            let locale = session
                .get::<String>(LANGUAGE_SESSION_KEY)?
                .unwrap_or_else(|| settings.locale.locale.clone());
            Ok(Arc::new(Translator::new(store, &locale)?))
        })?;

        container.register_scoped(|r: &Resolver<'_>| {
            let translator = r.resolve::<Translator>()?;
            let session = r.resolve::<SessionStore>()?;
            Ok(Arc::new(Locale::new(translator, session)))
        })?;
        Ok(())
    }

    fn register_web(&self, container: &ServiceContainer) -> Result<(), ContainerError> {
        container.register_scoped(|r: &Resolver<'_>| {
            let settings = r.resolve::<Settings>()?;
            let csrf = r.resolve::<CsrfGuard>()?;
            let cache = settings
                .twig
                .cache_enabled
                .then(|| settings.twig.cache_path.clone());

            let mut renderer = TemplateRenderer::new(settings.twig.path.clone(), settings.public.clone())
                .with_cache(cache);
            renderer.add_global("csrf_name", json!(csrf.token_name()));
            renderer.add_lazy_global("csrf_token", move || {
                csrf.token()
                    .map(Value::String)
                    .map_err(|e| RenderError::Global("csrf_token".to_string(), e.to_string()))
            });
            let renderer: Arc<dyn Renderer> = Arc::new(renderer);
            Ok(renderer)
        })?;
        Ok(())
    }
}
