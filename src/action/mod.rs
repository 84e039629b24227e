//! 请求处理
//!
//! `Action` 是一个请求处理单元；`dispatch` 为它组装请求上下文，
//! 对会改变状态的请求先校验 CSRF 令牌，校验失败时动作不会执行。

pub mod context;
pub mod home;

pub use context::RequestContext;
pub use home::{HomeIndexAction, HomePingAction};

use crate::errors::AppError;
use crate::infrastructure::container::RequestScope;
use crate::logging::OperationTimer;
use crate::security::CSRF_HEADER;
use serde_json::Value;
use std::collections::HashMap;

/// 框架无关的请求
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub method: String,
    pub path: String,
    /// 键为小写
    headers: HashMap<String, String>,
    pub body: Value,
}

impl ActionRequest {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            headers: HashMap::new(),
            body: Value::Null,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn is_ajax(&self) -> bool {
        self.header("X-Requested-With")
            .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
    }
}

/// 框架无关的响应
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResponse {
    Html { status: u16, body: String },
    Json { status: u16, body: Value },
}

impl ActionResponse {
    pub fn html(body: String) -> Self {
        ActionResponse::Html { status: 200, body }
    }

    pub fn json(body: Value) -> Self {
        ActionResponse::Json { status: 200, body }
    }

    pub fn status(&self) -> u16 {
        match self {
            ActionResponse::Html { status, .. } | ActionResponse::Json { status, .. } => *status,
        }
    }
}

/// 请求处理单元
pub trait Action: Send + Sync {
    fn name(&self) -> &'static str;

    fn handle(&self, ctx: &RequestContext, request: &ActionRequest) -> Result<ActionResponse, AppError>;
}

/// 在请求作用域中执行动作
pub fn dispatch(
    action: &dyn Action,
    scope: &RequestScope,
    request: &ActionRequest,
) -> Result<ActionResponse, AppError> {
    let timer = OperationTimer::new(action.name())
        .with_metadata("method", &request.method)
        .with_metadata("path", &request.path)
        .with_metadata("request_id", &scope.id().to_string());

    let ctx = RequestContext::from_scope(scope)?;
    let csrf = ctx.csrf();
    let result = if csrf.requires_validation(&request.method, request.is_ajax()) {
        let token = csrf.extract_token(&request.body, request.header(CSRF_HEADER));
        csrf.protect(token, || action.handle(&ctx, request))
    } else {
        action.handle(&ctx, request)
    };

    if let Err(e) = &result {
        ctx.logger().error(&format!("{} failed: {}", action.name(), e));
    }
    timer.finish();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RuntimeMode, Settings};
    use crate::infrastructure::container::ContainerBuilder;
    use crate::infrastructure::provider::ProviderFactory;
    use crate::security::CsrfGuard;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn scope() -> RequestScope {
        let container = ContainerBuilder::new().build();
        ProviderFactory::new(Arc::new(Settings::default()), RuntimeMode::Cli)
            .register_default_providers(&container)
            .unwrap();
        container.begin_scope()
    }

    struct CountingAction(AtomicUsize);

    impl Action for CountingAction {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn handle(&self, _ctx: &RequestContext, _request: &ActionRequest) -> Result<ActionResponse, AppError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(ActionResponse::json(json!({"ok": true})))
        }
    }

    #[test]
    fn test_ping_echoes_body_on_safe_method() {
        let request = ActionRequest::new("get", "/ping").with_body(json!({"a": [1, 2]}));
        let response = dispatch(&HomePingAction, &scope(), &request).unwrap();
        assert_eq!(response, ActionResponse::json(json!({"a": [1, 2]})));
    }

    #[test]
    fn test_post_without_token_is_rejected_before_action() {
        let action = CountingAction(AtomicUsize::new(0));
        let request = ActionRequest::new("POST", "/ping").with_body(json!({"name": "x"}));

        let err = dispatch(&action, &scope(), &request).unwrap_err();
        assert_eq!(err.status_code(), 403);
        assert_eq!(action.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_post_with_header_token_runs_action() {
        let scope = scope();
        let token = scope.resolve::<CsrfGuard>().unwrap().token().unwrap();
        let action = CountingAction(AtomicUsize::new(0));
        let request = ActionRequest::new("POST", "/ping").with_header(CSRF_HEADER, &token);

        assert!(dispatch(&action, &scope, &request).is_ok());
        assert_eq!(action.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_request_helpers() {
        let request = ActionRequest::new("post", "/")
            .with_header("x-requested-with", "XMLHttpRequest");
        assert_eq!(request.method, "POST");
        assert!(request.is_ajax());
        assert_eq!(request.header("X-REQUESTED-WITH"), Some("XMLHttpRequest"));
        assert_eq!(ActionResponse::html(String::new()).status(), 200);
    }
}
