//! 国际化：消息目录、占位符插值与翻译服务

pub mod catalog;
pub mod format;
pub mod translator;

pub use catalog::{Catalog, CatalogLoader, CatalogStore, TomlCatalogLoader};
pub use format::{interpolate, TransArg};
pub use translator::{Locale, Translator, LANGUAGE_SESSION_KEY};

/// 翻译并插值：`t!(translator, "There are %s persons logged", 7)`
///
/// 返回 `Result<String, TranslationError>`。
#[macro_export]
macro_rules! t {
    ($translator:expr, $key:expr) => {
        $translator.translate($key, &[])
    };
    ($translator:expr, $key:expr, $($arg:expr),+ $(,)?) => {
        $translator.translate($key, &[$($crate::i18n::TransArg::from($arg)),+])
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_t_macro() {
        let dir = TempDir::new().unwrap();
        let store = std::sync::Arc::new(CatalogStore::new(Box::new(TomlCatalogLoader::new(
            dir.path().to_path_buf(),
        ))));
        let translator = Translator::new(store, "en_US").unwrap();

        assert_eq!(crate::t!(translator, "Yes").unwrap(), "Yes");
        assert_eq!(
            crate::t!(translator, "%s of %d", "one", 2).unwrap(),
            "one of 2"
        );
    }
}
