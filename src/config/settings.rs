use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::errors::ConfigError;

pub const DEVELOPMENT: &str = "development";

/// Deployment environment, derived from the `env` setting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    /// Any other name; container definitions are cached in this mode
    Deployed(String),
}

impl Environment {
    pub fn from_name(name: &str) -> Self {
        if name == DEVELOPMENT {
            Environment::Development
        } else {
            Environment::Deployed(name.to_string())
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

/// How the process is being driven; chosen by the entry point, never sniffed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeMode {
    /// Batch / CLI / tests: transient in-memory session
    Cli,
    /// Serving HTTP: cookie-backed persistent session
    Server,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub env: String,
    pub temp: PathBuf,
    pub public: PathBuf,
    pub display_error_details: bool,
    pub db: DbSettings,
    pub logger: LoggerSettings,
    pub locale: LocaleSettings,
    /// Opaque options handed to the session store
    pub session: toml::Table,
    pub twig: TwigSettings,
    /// Asset pipeline options, passed through untouched
    pub assets: toml::Table,
    pub csrf: CsrfSettings,
    pub router: RouterSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            env: DEVELOPMENT.to_string(),
            temp: PathBuf::from("tmp"),
            public: PathBuf::from("public"),
            display_error_details: false,
            db: DbSettings::default(),
            logger: LoggerSettings::default(),
            locale: LocaleSettings::default(),
            session: toml::Table::new(),
            twig: TwigSettings::default(),
            assets: toml::Table::new(),
            csrf: CsrfSettings::default(),
            router: RouterSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbSettings {
    pub host: String,
    pub database: String,
    pub username: String,
    pub password: String,
    pub charset: String,
    pub collation: String,
}

impl Default for DbSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            database: "test".to_string(),
            username: "root".to_string(),
            password: String::new(),
            charset: "utf8mb4".to_string(),
            collation: "utf8mb4_unicode_ci".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerSettings {
    pub name: String,
    /// Monolog-style level name; `error` when unset
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            name: "app".to_string(),
            level: None,
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocaleSettings {
    pub locale: String,
    /// Directory for flattened catalog caches; caching is off when unset
    pub cache: Option<PathBuf>,
    pub path: PathBuf,
}

impl Default for LocaleSettings {
    fn default() -> Self {
        Self {
            locale: "en_US".to_string(),
            cache: None,
            path: PathBuf::from("resources/locale"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwigSettings {
    pub path: PathBuf,
    pub cache_enabled: bool,
    pub cache_path: PathBuf,
}

impl Default for TwigSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("templates"),
            cache_enabled: false,
            cache_path: PathBuf::from("tmp/twig-cache"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsrfSettings {
    pub salt: String,
    pub token_name: String,
    pub protect_forms: bool,
    pub protect_ajax: bool,
}

impl Default for CsrfSettings {
    fn default() -> Self {
        Self {
            salt: "secret".to_string(),
            token_name: "__token".to_string(),
            protect_forms: true,
            protect_ajax: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    /// Prefix under which the application is mounted, e.g. `/app`
    pub base_path: String,
}

impl Settings {
    pub fn environment(&self) -> Environment {
        Environment::from_name(&self.env)
    }

    /// Parse settings from a TOML document; missing keys take defaults
    pub fn from_toml_str(content: &str, source: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::TomlParse(source.to_string(), e))
    }

    /// Apply overrides collected from the process environment
    pub fn apply_env(&mut self, env_map: &HashMap<String, String>) {
        if let Some(env) = env_map.get("APP_ENV") {
            self.env = env.clone();
        }
        if let Some(password) = env_map.get("APP_DB_PASSWORD") {
            self.db.password = password.clone();
        }
    }

    /// Expand `~` in every configured path
    pub fn expand_paths(&mut self) {
        fn expand(path: &mut PathBuf) {
            if let Some(raw) = path.to_str() {
                let expanded = shellexpand::tilde(raw).into_owned();
                *path = PathBuf::from(expanded);
            }
        }

        expand(&mut self.temp);
        expand(&mut self.public);
        expand(&mut self.locale.path);
        expand(&mut self.twig.path);
        expand(&mut self.twig.cache_path);
        if let Some(cache) = self.locale.cache.as_mut() {
            expand(cache);
        }
        if let Some(file) = self.logger.file.as_mut() {
            expand(file);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.logger.name.trim().is_empty() {
            return Err(ConfigError::FieldMissing("logger.name".to_string()));
        }
        if let Some(level) = &self.logger.level {
            crate::logging::parse_level(level)
                .ok_or_else(|| ConfigError::InvalidValue("logger.level".to_string(), level.clone()))?;
        }
        if self.locale.locale.trim().is_empty() {
            return Err(ConfigError::FieldMissing("locale.locale".to_string()));
        }
        Ok(())
    }

    /// Session cookie name (`session.name`), `app_session` when unset
    pub fn session_name(&self) -> String {
        self.session
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("app_session")
            .to_string()
    }
}
