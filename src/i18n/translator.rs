use super::catalog::{Catalog, CatalogStore};
use super::format::{interpolate, TransArg};
use crate::errors::{AppError, TranslationError};
use crate::session::SessionStore;
use parking_lot::RwLock;
use std::sync::Arc;

/// 会话中保存语言选择的键
pub const LANGUAGE_SESSION_KEY: &str = "lang";

/// 翻译服务
///
/// 缺失的键不是错误：直接显示键本身。只有插值失败才返回错误。
pub struct Translator {
    store: Arc<CatalogStore>,
    active: RwLock<(String, Arc<Catalog>)>,
}

impl Translator {
    pub fn new(store: Arc<CatalogStore>, locale: &str) -> Result<Self, TranslationError> {
        let catalog = store.catalog(locale)?;
        Ok(Self {
            store,
            active: RwLock::new((locale.to_string(), catalog)),
        })
    }

    pub fn locale(&self) -> String {
        self.active.read().0.clone()
    }

    /// 切换当前语言
    pub fn set_locale(&self, locale: &str) -> Result<(), TranslationError> {
        let catalog = self.store.catalog(locale)?;
        *self.active.write() = (locale.to_string(), catalog);
        tracing::debug!(locale, "Translator locale switched");
        Ok(())
    }

    pub fn has(&self, key: &str) -> bool {
        self.active.read().1.contains_key(key)
    }

    /// 不带参数的查找
    pub fn trans(&self, key: &str) -> String {
        let active = self.active.read();
        match active.1.get(key) {
            Some(text) => text.clone(),
            None => {
                tracing::trace!(key, locale = %active.0, "Missing translation");
                key.to_string()
            }
        }
    }

    /// 查找并按位置插值；没有参数时原样返回
    pub fn translate(&self, key: &str, args: &[TransArg]) -> Result<String, TranslationError> {
        let text = self.trans(key);
        if args.is_empty() {
            return Ok(text);
        }
        interpolate(&text, args)
    }
}

/// 语言选择服务：切换翻译语言并记住选择
pub struct Locale {
    translator: Arc<Translator>,
    session: Arc<SessionStore>,
}

impl Locale {
    pub fn new(translator: Arc<Translator>, session: Arc<SessionStore>) -> Self {
        Self {
            translator,
            session,
        }
    }

    pub fn current(&self) -> String {
        self.translator.locale()
    }

    pub fn set_language(&self, locale: &str) -> Result<(), AppError> {
        self.translator.set_locale(locale)?;
        self.session.set(LANGUAGE_SESSION_KEY, locale)?;
        Ok(())
    }
}
