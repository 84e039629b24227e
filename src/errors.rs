use crate::infrastructure::container::ContainerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),
    #[error("Request context error: {0}")]
    Context(#[from] ContextError),
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
    #[error("CSRF error: {0}")]
    Csrf(#[from] CsrfError),
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Render error: {0}")]
    Render(#[from] RenderError),
    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("I/O error while {0}: {1}")]
    IO(String, #[source] std::io::Error),
    #[error("Application error: {0}")]
    Generic(String),
}

impl AppError {
    /// HTTP status used when this error reaches the request edge
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Csrf(_) => 403,
            AppError::BadRequest(_) => 400,
            _ => 500,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read file '{0}': {1}")]
    FileRead(String, #[source] std::io::Error),
    #[error("Failed to parse TOML from file '{0}': {1}")]
    TomlParse(String, #[source] toml::de::Error),
    #[error("Required configuration field '{0}' is missing or invalid")]
    FieldMissing(String),
    #[error("Invalid value for '{0}': {1}")]
    InvalidValue(String, String),
}

/// Request context assembly failed
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Failed to resolve request context: {0}")]
    Resolution(#[from] ContainerError),
    #[error("Failed to render template: {0}")]
    Render(#[from] RenderError),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session store unavailable: {0}")]
    Unavailable(String),
    #[error("Session value for '{0}' could not be decoded: {1}")]
    Decode(String, #[source] serde_json::Error),
    #[error("Session value for '{0}' could not be encoded: {1}")]
    Encode(String, #[source] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum CsrfError {
    #[error("Invalid CSRF token")]
    InvalidToken,
}

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("Malformed translation template '{template}': {reason}")]
    Format { template: String, reason: String },
    #[error("Failed to load catalog '{0}': {1}")]
    CatalogLoad(String, String),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Unknown table '{0}'")]
    UnknownTable(String),
    #[error("Database unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Malformed row in '{0}': {1}")]
    Mapping(String, #[source] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Template '{0}' not found")]
    TemplateNotFound(String),
    #[error("Failed to read template '{0}': {1}")]
    Read(String, #[source] std::io::Error),
    #[error("Unterminated expression in template '{0}'")]
    Syntax(String),
    #[error("Failed to evaluate template global '{0}': {1}")]
    Global(String, String),
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to open log file '{0}': {1}")]
    File(String, #[source] std::io::Error),
    #[error("Failed to install subscriber: {0}")]
    Init(String),
}
