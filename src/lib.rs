pub mod action;
pub mod app;
pub mod args;
pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod i18n;
pub mod infrastructure;
pub mod logging;
pub mod security;
pub mod server;
pub mod session;
pub mod utils;

// Re-export commonly used items for convenience
pub use app::Application;
pub use config::{RuntimeMode, Settings};
pub use errors::AppError;
pub use infrastructure::container::{ContainerError, RequestScope, ServiceContainer};
