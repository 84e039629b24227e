//! 容器定义缓存
//!
//! 按构建标识保存服务图的形状（名称、生命周期、观察到的依赖边），
//! 重启后的进程可以按已知可行的顺序预热单例。实例本身从不持久化。

use super::ServiceLifetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DefinitionCacheError {
    #[error("Failed to access definition cache '{0}': {1}")]
    Io(String, #[source] std::io::Error),
    #[error("Failed to encode definition cache: {0}")]
    Encode(#[source] serde_json::Error),
}

/// 一条缓存的服务定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionRecord {
    pub name: String,
    pub lifetime: ServiceLifetime,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionManifest {
    pub build_id: String,
    pub created_at: DateTime<Utc>,
    pub records: Vec<DefinitionRecord>,
}

impl DefinitionManifest {
    pub fn new(build_id: String, records: Vec<DefinitionRecord>) -> Self {
        Self {
            build_id,
            created_at: Utc::now(),
            records,
        }
    }
}

/// 定义清单的存储
pub trait DefinitionCache: Send + Sync {
    fn load(&self, build_id: &str) -> Result<Option<DefinitionManifest>, DefinitionCacheError>;
    fn store(&self, manifest: &DefinitionManifest) -> Result<(), DefinitionCacheError>;
}

/// 开发环境：不缓存
pub struct NoDefinitionCache;

impl DefinitionCache for NoDefinitionCache {
    fn load(&self, _build_id: &str) -> Result<Option<DefinitionManifest>, DefinitionCacheError> {
        Ok(None)
    }

    fn store(&self, _manifest: &DefinitionManifest) -> Result<(), DefinitionCacheError> {
        Ok(())
    }
}

/// 缓存目录下的 JSON 文件，每个构建标识一个
#[derive(Debug, Clone)]
pub struct FileDefinitionCache {
    cache_dir: PathBuf,
}

impl FileDefinitionCache {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    fn manifest_path(&self, build_id: &str) -> PathBuf {
        self.cache_dir.join(format!("definitions-{}.json", build_id))
    }
}

impl DefinitionCache for FileDefinitionCache {
    fn load(&self, build_id: &str) -> Result<Option<DefinitionManifest>, DefinitionCacheError> {
        let path = self.manifest_path(build_id);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .map_err(|e| DefinitionCacheError::Io(path.display().to_string(), e))?;

        // 损坏的条目视为未命中，下次写入时覆盖
        match serde_json::from_str::<DefinitionManifest>(&content) {
            Ok(manifest) if manifest.build_id == build_id => Ok(Some(manifest)),
            Ok(_) => Ok(None),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable definition cache");
                Ok(None)
            }
        }
    }

    fn store(&self, manifest: &DefinitionManifest) -> Result<(), DefinitionCacheError> {
        fs::create_dir_all(&self.cache_dir)
            .map_err(|e| DefinitionCacheError::Io(self.cache_dir.display().to_string(), e))?;

        let path = self.manifest_path(&manifest.build_id);
        let content = serde_json::to_string_pretty(manifest).map_err(DefinitionCacheError::Encode)?;
        fs::write(&path, content).map_err(|e| DefinitionCacheError::Io(path.display().to_string(), e))
    }
}

/// 构建标识：crate 版本加已注册服务名的摘要
pub fn build_identity<I, S>(names: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut names: Vec<String> = names.into_iter().map(|n| n.as_ref().to_string()).collect();
    names.sort();

    let mut hasher = Sha256::new();
    for name in &names {
        hasher.update(name.as_bytes());
        hasher.update(b"\n");
    }
    let digest = hex::encode(hasher.finalize());
    format!("{}-{}", env!("CARGO_PKG_VERSION"), &digest[..16])
}
