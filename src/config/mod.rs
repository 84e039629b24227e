pub mod loader;
pub mod settings;

// Re-export commonly used types
pub use loader::{ConfigLoader, CONFIG_FILE_NAME};
pub use settings::{
    CsrfSettings, DbSettings, Environment, LocaleSettings, LoggerSettings, RouterSettings,
    RuntimeMode, Settings, TwigSettings,
};
