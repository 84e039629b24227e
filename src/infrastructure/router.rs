//! 路由名称到路径的映射（路由分发本身由 HTTP 层负责）

/// 路由信息
#[derive(Debug, Clone)]
pub struct Router {
    base_path: String,
}

impl Router {
    pub fn new(base_path: &str) -> Self {
        Self {
            base_path: base_path.trim_end_matches('/').to_string(),
        }
    }

    /// 按路由名称生成路径；未知名称返回 `None`
    pub fn path_for(&self, name: &str) -> Option<String> {
        let path = match name {
            "root" => "/",
            "ping" => "/ping",
            _ => return None,
        };
        Some(format!("{}{}", self.base_path, path))
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }
}
