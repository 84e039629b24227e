use std::{collections::HashMap, env, fs, path::PathBuf};
use crate::errors::ConfigError;

use super::settings::Settings;

// Configuration file name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "config/settings.toml";

// Environment variables recognised by the loader
const ENV_KEYS: [&str; 3] = ["APP_ENV", "APP_CONFIG", "APP_DB_PASSWORD"];

/// Configuration loader responsible for loading settings from file and environment
pub struct ConfigLoader {
    path: Option<PathBuf>,
    env_map: Option<HashMap<String, String>>,
}

impl ConfigLoader {
    /// Create a new config loader with default paths
    pub fn new() -> Self {
        Self { path: None, env_map: None }
    }

    /// Create a config loader reading an explicit file
    pub fn with_path(path: PathBuf) -> Self {
        Self { path: Some(path), env_map: None }
    }

    /// Replace the process environment (for testing)
    pub fn with_env(mut self, env_map: HashMap<String, String>) -> Self {
        self.env_map = Some(env_map);
        self
    }

    /// Load complete application settings
    pub fn load(&self) -> Result<Settings, ConfigError> {
        let env_map = self.env_map.clone().unwrap_or_else(collect_env_vars);

        let mut settings = match self.resolve_path(&env_map) {
            Some((path, explicit)) => self.load_file(&path, explicit)?,
            None => Settings::default(),
        };

        settings.apply_env(&env_map);
        settings.expand_paths();
        settings.validate()?;

        tracing::debug!(env = %settings.env, "Settings loaded");
        Ok(settings)
    }

    /// Explicit path wins, then `APP_CONFIG`, then the default file if present
    fn resolve_path(&self, env_map: &HashMap<String, String>) -> Option<(PathBuf, bool)> {
        if let Some(path) = &self.path {
            return Some((expand(path), true));
        }
        if let Some(path) = env_map.get("APP_CONFIG") {
            return Some((expand(&PathBuf::from(path)), true));
        }
        let default = PathBuf::from(CONFIG_FILE_NAME);
        default.exists().then_some((default, false))
    }

    fn load_file(&self, path: &PathBuf, explicit: bool) -> Result<Settings, ConfigError> {
        let source = path.display().to_string();
        match fs::read_to_string(path) {
            Ok(content) => Settings::from_toml_str(&content, &source),
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("未发现配置文件，将使用默认配置");
                Ok(Settings::default())
            }
            Err(e) => Err(ConfigError::FileRead(source, e)),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_env_vars() -> HashMap<String, String> {
    ENV_KEYS
        .iter()
        .filter_map(|key| env::var(key).ok().map(|value| (key.to_string(), value)))
        .collect()
}

fn expand(path: &PathBuf) -> PathBuf {
    match path.to_str() {
        Some(raw) => PathBuf::from(shellexpand::tilde(raw).into_owned()),
        None => path.clone(),
    }
}
