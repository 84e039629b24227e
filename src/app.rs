// 应用程序装配

use crate::action::{dispatch, Action, ActionRequest, ActionResponse};
use crate::config::{ConfigLoader, RuntimeMode, Settings};
use crate::errors::AppError;
use crate::infrastructure::container::{ContainerBuilder, ContainerError, RequestScope, ServiceContainer};
use crate::infrastructure::provider::ProviderFactory;
use crate::session::{SessionCookie, SessionStore};
use std::sync::Arc;

/// 一次请求处理的结果
#[derive(Debug)]
pub struct RequestOutcome {
    pub response: ActionResponse,
    /// 处理结束时的会话 id，用于回写 cookie；请求没有用到会话时为 `None`
    pub session_id: Option<String>,
}

/// 应用程序：进程启动时构建一次容器，进程结束时随之释放
pub struct Application {
    settings: Arc<Settings>,
    container: ServiceContainer,
    mode: RuntimeMode,
}

impl Application {
    /// 按配置构建容器并注册默认服务
    ///
    /// 非开发环境会从定义缓存预热单例，并刷新缓存。
    pub fn bootstrap(settings: Settings, mode: RuntimeMode) -> Result<Self, AppError> {
        let settings = Arc::new(settings);
        let container = ContainerBuilder::from_settings(&settings).build();
        ProviderFactory::new(settings.clone(), mode).register_default_providers(&container)?;

        if !settings.environment().is_development() {
            container.warm_up()?;
            container.persist_definitions()?;
        }

        tracing::info!(
            env = %settings.env,
            mode = ?mode,
            services = container.registered_services().len(),
            "Application bootstrapped"
        );
        Ok(Self {
            settings,
            container,
            mode,
        })
    }

    /// 从配置文件和环境变量加载配置后构建
    pub fn from_loader(loader: &ConfigLoader, mode: RuntimeMode) -> Result<Self, AppError> {
        Self::bootstrap(loader.load()?, mode)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn container(&self) -> &ServiceContainer {
        &self.container
    }

    pub fn mode(&self) -> RuntimeMode {
        self.mode
    }

    /// 为入站请求开启作用域，预置请求携带的会话 cookie
    pub fn begin_request(&self, cookie: Option<String>) -> RequestScope {
        let scope = self.container.begin_scope();
        scope.provide(Arc::new(SessionCookie(cookie)));
        scope
    }

    /// 处理一个请求：一个作用域，一个请求上下文
    pub fn handle(
        &self,
        action: &dyn Action,
        request: &ActionRequest,
        cookie: Option<String>,
    ) -> Result<RequestOutcome, AppError> {
        let scope = self.begin_request(cookie);
        let response = dispatch(action, &scope, request)?;
        let session_id = scope.resolve::<SessionStore>()?.current_id();
        Ok(RequestOutcome {
            response,
            session_id,
        })
    }

    /// 在一个作用域内解析全部服务
    pub fn check(&self) -> Vec<(&'static str, Result<(), ContainerError>)> {
        self.begin_request(None).resolve_all()
    }

    /// 持久化定义（开发环境下为空操作）
    pub fn shutdown(&self) -> Result<(), AppError> {
        if !self.settings.environment().is_development() {
            self.container.persist_definitions()?;
        }
        let stats = self.container.get_stats();
        tracing::info!(
            resolutions = stats.total_resolutions,
            hit_rate = stats.hit_rate(),
            "Application shut down"
        );
        Ok(())
    }
}
