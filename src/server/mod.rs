//! HTTP 服务（warp）
//!
//! 每个请求开启一个作用域并组装一个请求上下文；
//! 动作在阻塞线程池中执行，响应回写会话 cookie。

use crate::action::{Action, ActionRequest, ActionResponse, HomeIndexAction, HomePingAction};
use crate::app::Application;
use crate::errors::AppError;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use warp::hyper::body::Bytes;
use warp::path::FullPath;
use warp::reply::Response;
use warp::{Filter, Reply};

/// 启动 HTTP 服务，直到进程退出
pub async fn serve(app: Arc<Application>, addr: SocketAddr) {
    tracing::info!(%addr, "HTTP server starting");
    warp::serve(routes(app)).run(addr).await;
    tracing::info!("HTTP server shutting down");
}

/// 全部路由：`GET /` 与 `POST /ping`
pub fn routes(
    app: Arc<Application>,
) -> impl Filter<Extract = (Response,), Error = warp::Rejection> + Clone {
    let base = app.settings().router.base_path.trim_matches('/').to_string();
    let with_app = warp::any().map(move || app.clone());

    let index_action: Arc<dyn Action> = Arc::new(HomeIndexAction);
    let index = warp::get()
        .and(warp::path::end())
        .and(warp::any().map(move || index_action.clone()))
        .and(with_app.clone())
        .and(warp::method())
        .and(warp::path::full())
        .and(warp::header::headers_cloned())
        .and(warp::any().map(Bytes::new))
        .and_then(handle);

    let ping_action: Arc<dyn Action> = Arc::new(HomePingAction);
    let ping = warp::post()
        .and(warp::path("ping"))
        .and(warp::path::end())
        .and(warp::any().map(move || ping_action.clone()))
        .and(with_app)
        .and(warp::method())
        .and(warp::path::full())
        .and(warp::header::headers_cloned())
        .and(warp::body::bytes())
        .and_then(handle);

    let routes = index.or(ping).unify();
    mount(base).and(routes)
}

fn mount(base: String) -> warp::filters::BoxedFilter<()> {
    if base.is_empty() {
        return warp::any().boxed();
    }
    base.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.to_string())
        .fold(warp::any().boxed(), |filter, segment| {
            filter.and(warp::path(segment)).boxed()
        })
}

async fn handle(
    action: Arc<dyn Action>,
    app: Arc<Application>,
    method: Method,
    path: FullPath,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, Infallible> {
    let session_name = app.settings().session_name();
    let cookie = session_cookie(&headers, &session_name);

    let request = match parse_body(&body) {
        Ok(body) => build_request(&method, path.as_str(), &headers, body),
        Err(e) => return Ok(error_response(&app, &e)),
    };

    let worker_app = app.clone();
    let outcome = tokio::task::spawn_blocking(move || worker_app.handle(action.as_ref(), &request, cookie))
        .await
        .unwrap_or_else(|e| Err(AppError::Generic(format!("request worker failed: {}", e))));

    let response = match outcome {
        Ok(outcome) => {
            let mut response = into_response(outcome.response);
            if let Some(session_id) = outcome.session_id {
                let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", session_name, session_id);
                if let Ok(value) = cookie.parse::<HeaderValue>() {
                    response.headers_mut().insert(header::SET_COOKIE, value);
                }
            }
            response
        }
        Err(e) => error_response(&app, &e),
    };
    Ok(response)
}

fn parse_body(body: &[u8]) -> Result<Value, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("invalid JSON body: {}", e)))
}

fn build_request(method: &Method, path: &str, headers: &HeaderMap, body: Value) -> ActionRequest {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .fold(ActionRequest::new(method.as_str(), path), |request, (name, value)| {
            request.with_header(name, value)
        })
        .with_body(body)
}

/// 从 `Cookie` 请求头中取出会话 id
fn session_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

fn into_response(response: ActionResponse) -> Response {
    match response {
        ActionResponse::Html { status, body } => {
            warp::reply::with_status(warp::reply::html(body), status_code(status)).into_response()
        }
        ActionResponse::Json { status, body } => {
            warp::reply::with_status(warp::reply::json(&body), status_code(status)).into_response()
        }
    }
}

fn status_code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn error_response(app: &Application, error: &AppError) -> Response {
    let status = status_code(error.status_code());
    let message = if status == StatusCode::INTERNAL_SERVER_ERROR && !app.settings().display_error_details {
        "Internal Server Error".to_string()
    } else {
        error.to_string()
    };
    tracing::warn!(status = status.as_u16(), error = %error, "Request failed");
    warp::reply::with_status(warp::reply::json(&json!({ "error": message })), status).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "theme=dark; app_session=abc123".parse().unwrap());
        assert_eq!(session_cookie(&headers, "app_session"), Some("abc123".to_string()));
        assert_eq!(session_cookie(&headers, "other"), None);
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(b"").unwrap(), Value::Null);
        assert_eq!(parse_body(b"{\"a\":1}").unwrap(), json!({"a": 1}));
        assert_eq!(parse_body(b"{oops").unwrap_err().status_code(), 400);
    }

    #[test]
    fn test_build_request_copies_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-csrf-token", "tok".parse().unwrap());
        let request = build_request(&Method::POST, "/ping", &headers, json!({}));
        assert_eq!(request.method, "POST");
        assert_eq!(request.header("X-CSRF-Token"), Some("tok"));
    }
}
