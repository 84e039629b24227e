//! CSRF 防护
//!
//! 令牌由会话 id 和盐值确定性地派生（SHA-256 十六进制），
//! 因此令牌只对产生它的会话有效；会话销毁后 id 改变，旧令牌随之失效。
//! 守卫每次都从当前会话读取 id，同一请求内注销后立即换用新会话的令牌。

use crate::config::CsrfSettings;
use crate::errors::{CsrfError, SessionError};
use crate::session::SessionStore;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// 携带令牌的请求头
pub const CSRF_HEADER: &str = "X-CSRF-Token";

const SAFE_METHODS: [&str; 3] = ["GET", "HEAD", "OPTIONS"];

/// 由会话 id 和盐值派生令牌
pub fn derive_token(session_id: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

/// 绑定到当前会话的 CSRF 守卫
pub struct CsrfGuard {
    session: Arc<SessionStore>,
    salt: String,
    token_name: String,
    protect_forms: bool,
    protect_ajax: bool,
}

impl CsrfGuard {
    pub fn new(session: Arc<SessionStore>, settings: &CsrfSettings) -> Self {
        Self {
            session,
            salt: settings.salt.clone(),
            token_name: settings.token_name.clone(),
            protect_forms: settings.protect_forms,
            protect_ajax: settings.protect_ajax,
        }
    }

    /// 计算某个会话的令牌
    pub fn token_for(&self, session_id: &str) -> String {
        derive_token(session_id, &self.salt)
    }

    /// 当前会话的令牌；会话还没有 id 时会分配一个
    pub fn token(&self) -> Result<String, SessionError> {
        Ok(self.token_for(&self.session.id()?))
    }

    pub fn token_name(&self) -> &str {
        &self.token_name
    }

    pub fn session_id(&self) -> Result<String, SessionError> {
        self.session.id()
    }

    pub fn protects_forms(&self) -> bool {
        self.protect_forms
    }

    pub fn protects_ajax(&self) -> bool {
        self.protect_ajax
    }

    /// 令牌是否由给定会话派生
    pub fn validate(&self, token: &str, session_id: &str) -> bool {
        constant_time_eq(token.as_bytes(), self.token_for(session_id).as_bytes())
    }

    /// 校验请求携带的令牌是否属于当前会话
    ///
    /// 还没有分配 id 的会话不可能签发过令牌，直接拒绝，不会为此新建会话。
    pub fn verify(&self, token: Option<&str>) -> Result<(), CsrfError> {
        let session_id = self.session.current_id();
        match (token, session_id.as_deref()) {
            (Some(token), Some(id)) if self.validate(token, id) => Ok(()),
            _ => {
                tracing::warn!(session = ?session_id, "CSRF token rejected");
                Err(CsrfError::InvalidToken)
            }
        }
    }

    /// 校验通过后才执行 `action`；失败时 `action` 不会被调用
    pub fn protect<T, E, F>(&self, token: Option<&str>, action: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<CsrfError>,
    {
        self.verify(token)?;
        action()
    }

    /// 该方法的请求是否需要校验
    pub fn requires_validation(&self, method: &str, is_ajax: bool) -> bool {
        if SAFE_METHODS.iter().any(|safe| safe.eq_ignore_ascii_case(method)) {
            return false;
        }
        if is_ajax {
            self.protect_ajax
        } else {
            self.protect_forms
        }
    }

    /// 先取表单字段，再取请求头
    pub fn extract_token<'a>(&self, body: &'a Value, header: Option<&'a str>) -> Option<&'a str> {
        body.get(&self.token_name)
            .and_then(Value::as_str)
            .or(header)
    }

    /// 给每个 POST 表单插入隐藏的令牌字段
    pub fn inject_form_field(&self, html: &str) -> Result<String, SessionError> {
        let field = format!(
            "<input type=\"hidden\" name=\"{}\" value=\"{}\">",
            self.token_name,
            self.token()?
        );
        let mut output = String::with_capacity(html.len());
        let mut rest = html;

        while let Some(start) = find_form_tag(rest) {
            let Some(end) = rest[start..].find('>') else {
                break;
            };
            let tag_end = start + end + 1;
            let tag = &rest[start..tag_end];
            output.push_str(&rest[..tag_end]);
            if tag.to_ascii_lowercase().contains("method=\"post\"") {
                output.push_str(&field);
            }
            rest = &rest[tag_end..];
        }
        output.push_str(rest);
        Ok(output)
    }
}

fn find_form_tag(html: &str) -> Option<usize> {
    let lower = html.to_ascii_lowercase();
    lower
        .match_indices("<form")
        .map(|(i, _)| i)
        .find(|&i| matches!(lower.as_bytes().get(i + 5), Some(b' ' | b'>' | b'\t' | b'\n')))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
