//! HTTP 路由测试（warp::test）

use appkernel::config::{RuntimeMode, Settings};
use appkernel::security::CSRF_HEADER;
use appkernel::Application;
use serde_json::{json, Value};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn app(dir: &TempDir) -> Arc<Application> {
    let templates = dir.path().join("templates");
    fs::create_dir_all(templates.join("home")).unwrap();
    fs::write(
        templates.join("home/index.html"),
        "<form method=\"post\" action=\"{{ baseUrl }}ping\"></form><meta name=\"csrf\" content=\"{{ csrf_token }}\">",
    )
    .unwrap();

    let mut settings = Settings::default();
    settings.twig.path = templates;
    Arc::new(Application::bootstrap(settings, RuntimeMode::Server).unwrap())
}

fn session_cookie(response: &warp::http::Response<warp::hyper::body::Bytes>) -> String {
    let header = response
        .headers()
        .get("set-cookie")
        .expect("session cookie")
        .to_str()
        .unwrap();
    header.split(';').next().unwrap().to_string()
}

fn csrf_token(body: &str) -> String {
    let marker = "content=\"";
    let start = body.find(marker).unwrap() + marker.len();
    let end = body[start..].find('"').unwrap();
    body[start..start + end].to_string()
}

#[tokio::test]
async fn test_index_sets_session_cookie() {
    let dir = TempDir::new().unwrap();
    let routes = appkernel::server::routes(app(&dir));

    let response = warp::test::request().method("GET").path("/").reply(&routes).await;
    assert_eq!(response.status(), 200);
    assert!(session_cookie(&response).starts_with("app_session="));
    let body = String::from_utf8(response.body().to_vec()).unwrap();
    assert!(body.contains("name=\"__token\""));
}

#[tokio::test]
async fn test_ping_requires_csrf_token() {
    let dir = TempDir::new().unwrap();
    let routes = appkernel::server::routes(app(&dir));

    let response = warp::test::request()
        .method("POST")
        .path("/ping")
        .json(&json!({"hello": "world"}))
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 403);
    // 被拒绝的请求不会分配会话
    assert!(response.headers().get("set-cookie").is_none());
}

#[tokio::test]
async fn test_ping_echoes_body_with_valid_token() {
    let dir = TempDir::new().unwrap();
    let routes = appkernel::server::routes(app(&dir));

    let index = warp::test::request().method("GET").path("/").reply(&routes).await;
    let cookie = session_cookie(&index);
    let token = csrf_token(std::str::from_utf8(index.body()).unwrap());

    let response = warp::test::request()
        .method("POST")
        .path("/ping")
        .header("cookie", &cookie)
        .header(CSRF_HEADER, &token)
        .json(&json!({"hello": "world", "n": [1, 2, 3]}))
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body, json!({"hello": "world", "n": [1, 2, 3]}));
    assert_eq!(session_cookie(&response), cookie);
}

#[tokio::test]
async fn test_invalid_json_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let routes = appkernel::server::routes(app(&dir));

    let response = warp::test::request()
        .method("POST")
        .path("/ping")
        .body("{not json")
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_missing_template_hides_details() {
    let dir = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.twig.path = dir.path().join("nowhere");
    let routes = appkernel::server::routes(Arc::new(
        Application::bootstrap(settings, RuntimeMode::Server).unwrap(),
    ));

    let response = warp::test::request().method("GET").path("/").reply(&routes).await;
    assert_eq!(response.status(), 500);
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["error"], "Internal Server Error");
}
