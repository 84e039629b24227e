//! 请求上下文
//!
//! 每个入站请求组装一次，持有从容器解析出的服务引用；
//! 不复用，不池化。

use crate::auth::AuthService;
use crate::domain::{Connection, Renderer};
use crate::errors::ContextError;
use crate::i18n::Translator;
use crate::infrastructure::container::RequestScope;
use crate::infrastructure::router::Router;
use crate::logging::Logger;
use crate::security::CsrfGuard;
use crate::session::SessionStore;
use crate::utils::merge_recursive;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// 默认文本的键
const DEFAULT_TEXT_KEYS: [&str; 4] = ["Ok", "Cancel", "Yes", "No"];

pub struct RequestContext {
    request_id: uuid::Uuid,
    db: Arc<dyn Connection>,
    logger: Arc<Logger>,
    router: Arc<Router>,
    auth: Arc<AuthService>,
    view: Arc<dyn Renderer>,
    session: Arc<SessionStore>,
    translator: Arc<Translator>,
    csrf: Arc<CsrfGuard>,
}

impl RequestContext {
    /// 从请求作用域解析全部依赖；任一失败都会中止组装
    pub fn from_scope(scope: &RequestScope) -> Result<Self, ContextError> {
        Ok(Self {
            request_id: scope.id(),
            db: scope.resolve::<dyn Connection>()?,
            logger: scope.resolve::<Logger>()?,
            router: scope.resolve::<Router>()?,
            auth: scope.resolve::<AuthService>()?,
            view: scope.resolve::<dyn Renderer>()?,
            session: scope.resolve::<SessionStore>()?,
            translator: scope.resolve::<Translator>()?,
            csrf: scope.resolve::<CsrfGuard>()?,
        })
    }

    pub fn request_id(&self) -> uuid::Uuid {
        self.request_id
    }

    pub fn db(&self) -> &Arc<dyn Connection> {
        &self.db
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    pub fn csrf(&self) -> &CsrfGuard {
        &self.csrf
    }

    /// 默认文本：Ok / Cancel / Yes / No 的翻译
    pub fn text(&self) -> Value {
        let text: Map<String, Value> = DEFAULT_TEXT_KEYS
            .iter()
            .map(|key| (key.to_string(), Value::String(self.translator.trans(key))))
            .collect();
        Value::Object(text)
    }

    /// 视图数据：`{baseUrl, text}`，`extra` 递归覆盖默认值
    ///
    /// 只合并对象；`null` 或其他非对象的 `extra` 不改变默认值。
    pub fn view_data(&self, extra: Value) -> Value {
        let base_url = self.router.path_for("root").unwrap_or_else(|| "/".to_string());
        let mut data = json!({
            "baseUrl": base_url,
            "text": self.text(),
        });
        if extra.is_object() {
            merge_recursive(&mut data, extra);
        }
        data
    }

    pub fn render(&self, name: &str, data: &Value) -> Result<String, ContextError> {
        Ok(self.view.render(name, data)?)
    }
}
