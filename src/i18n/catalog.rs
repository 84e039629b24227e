//! 消息目录
//!
//! 目录文件格式是可替换的协作者；默认加载器读取
//! `{locale.path}/{locale}.toml`，嵌套表以点号展平为键。
//! 配置了 `locale.cache` 时，展平后的目录以 JSON 写入缓存目录，
//! 缓存不比源文件旧时直接读取缓存。

use crate::errors::TranslationError;
use dashmap::DashMap;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 一个语言的消息目录
pub type Catalog = HashMap<String, String>;

/// 目录加载器
pub trait CatalogLoader: Send + Sync {
    fn load(&self, locale: &str) -> Result<Catalog, TranslationError>;
}

/// 从 TOML 文件加载目录；文件不存在时为空目录
pub struct TomlCatalogLoader {
    path: PathBuf,
    cache: Option<PathBuf>,
}

impl TomlCatalogLoader {
    pub fn new(path: PathBuf) -> Self {
        Self { path, cache: None }
    }

    pub fn with_cache(mut self, cache: Option<PathBuf>) -> Self {
        self.cache = cache;
        self
    }

    fn file_for(&self, locale: &str) -> PathBuf {
        self.path.join(format!("{}.toml", locale))
    }

    fn cache_file_for(&self, locale: &str) -> Option<PathBuf> {
        self.cache
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", locale)))
    }

    fn read_cache(&self, locale: &str, source: &Path) -> Option<Catalog> {
        let cache_file = self.cache_file_for(locale)?;
        let cached_at = fs::metadata(&cache_file).ok()?.modified().ok()?;
        let source_at = fs::metadata(source).ok()?.modified().ok()?;
        if cached_at < source_at {
            return None;
        }
        let content = fs::read_to_string(&cache_file).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// 写缓存失败只记录日志，不影响翻译
    fn write_cache(&self, locale: &str, catalog: &Catalog) {
        let Some(cache_file) = self.cache_file_for(locale) else {
            return;
        };
        let result = cache_file
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| {
                let json = serde_json::to_string(catalog).map_err(std::io::Error::other)?;
                fs::write(&cache_file, json)
            });
        if let Err(e) = result {
            tracing::warn!(locale, path = %cache_file.display(), error = %e, "Failed to write catalog cache");
        }
    }
}

impl CatalogLoader for TomlCatalogLoader {
    fn load(&self, locale: &str) -> Result<Catalog, TranslationError> {
        let file = self.file_for(locale);
        let content = match fs::read_to_string(&file) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(locale, path = %file.display(), "No catalog file, using keys as text");
                return Ok(Catalog::new());
            }
            Err(e) => return Err(TranslationError::CatalogLoad(locale.to_string(), e.to_string())),
        };

        if let Some(catalog) = self.read_cache(locale, &file) {
            tracing::debug!(locale, "Catalog loaded from cache");
            return Ok(catalog);
        }

        let table: toml::Table = toml::from_str(&content)
            .map_err(|e| TranslationError::CatalogLoad(locale.to_string(), e.to_string()))?;
        let mut catalog = Catalog::new();
        flatten("", &table, &mut catalog);
        self.write_cache(locale, &catalog);
        Ok(catalog)
    }
}

fn flatten(prefix: &str, table: &toml::Table, catalog: &mut Catalog) {
    for (key, value) in table {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            toml::Value::String(text) => {
                catalog.insert(full_key, text.clone());
            }
            toml::Value::Table(nested) => flatten(&full_key, nested, catalog),
            _ => tracing::warn!(key = %full_key, "Ignoring non-string catalog entry"),
        }
    }
}

/// 进程级目录缓存，每个语言只加载一次
pub struct CatalogStore {
    loader: Box<dyn CatalogLoader>,
    catalogs: DashMap<String, Arc<Catalog>>,
}

impl CatalogStore {
    pub fn new(loader: Box<dyn CatalogLoader>) -> Self {
        Self {
            loader,
            catalogs: DashMap::new(),
        }
    }

    pub fn catalog(&self, locale: &str) -> Result<Arc<Catalog>, TranslationError> {
        if let Some(catalog) = self.catalogs.get(locale) {
            return Ok(catalog.value().clone());
        }
        let catalog = Arc::new(self.loader.load(locale)?);
        self.catalogs
            .entry(locale.to_string())
            .or_insert_with(|| catalog.clone());
        Ok(catalog)
    }

    pub fn loaded_locales(&self) -> Vec<String> {
        let mut locales: Vec<String> = self.catalogs.iter().map(|e| e.key().clone()).collect();
        locales.sort();
        locales
    }
}
