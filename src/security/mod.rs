//! 安全相关服务

pub mod csrf;

pub use csrf::{derive_token, CsrfGuard, CSRF_HEADER};
