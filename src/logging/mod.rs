use crate::config::{Environment, Settings};
use crate::errors::LoggingError;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::time::Instant;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 日志环境配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingEnvironment {
    /// 开发环境
    Development,
    /// 测试环境
    Testing,
    /// 生产环境
    Production,
}

/// 日志格式配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// 人类可读格式
    Pretty,
    /// 紧凑格式
    Compact,
}

/// 日志配置
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// 环境
    pub environment: LoggingEnvironment,
    /// 日志级别
    pub level: Level,
    /// 输出格式
    pub format: LogFormat,
    /// 追加写入的日志文件
    pub file_output: Option<PathBuf>,
    /// 是否显示目标模块
    pub show_target: bool,
    /// 是否显示线程ID
    pub show_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            environment: LoggingEnvironment::Development,
            level: Level::INFO,
            format: LogFormat::Pretty,
            file_output: None,
            show_target: true,
            show_thread_ids: false,
        }
    }
}

impl LoggingConfig {
    /// 创建开发环境配置
    pub fn development() -> Self {
        Self {
            environment: LoggingEnvironment::Development,
            level: Level::DEBUG,
            format: LogFormat::Pretty,
            file_output: None,
            show_target: true,
            show_thread_ids: true,
        }
    }

    /// 创建生产环境配置
    pub fn production() -> Self {
        Self {
            environment: LoggingEnvironment::Production,
            level: Level::ERROR,
            format: LogFormat::Compact,
            file_output: None,
            show_target: false,
            show_thread_ids: false,
        }
    }

    /// 创建测试环境配置
    pub fn testing() -> Self {
        Self {
            environment: LoggingEnvironment::Testing,
            level: Level::ERROR,
            format: LogFormat::Compact,
            file_output: None,
            show_target: false,
            show_thread_ids: false,
        }
    }

    /// 由 `logger` 配置段生成：未设置级别时为 error
    pub fn from_settings(settings: &Settings) -> Self {
        let mut config = match settings.environment() {
            Environment::Development => Self::development(),
            Environment::Deployed(_) => Self::production(),
        };
        config.level = settings
            .logger
            .level
            .as_deref()
            .and_then(parse_level)
            .unwrap_or(Level::ERROR);
        config.file_output = settings.logger.file.clone();
        config
    }
}

/// 解析 Monolog 风格的级别名称
pub fn parse_level(name: &str) -> Option<Level> {
    match name.to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" | "notice" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" | "critical" | "alert" | "emergency" => Some(Level::ERROR),
        _ => None,
    }
}

/// 初始化日志系统
///
/// `RUST_LOG` 存在时优先于配置的级别；重复初始化返回 `LoggingError::Init`。
pub fn init_logging(config: LoggingConfig) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string().to_ascii_lowercase()));
    let ansi = config.environment == LoggingEnvironment::Development;

    let result = match (&config.file_output, config.format) {
        (Some(path), _) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| LoggingError::File(path.display().to_string(), e))?;
            let fmt_layer = fmt::layer()
                .compact()
                .with_ansi(false)
                .with_target(config.show_target)
                .with_writer(std::sync::Mutex::new(file));
            tracing_subscriber::registry().with(filter).with(fmt_layer).try_init()
        }
        (None, LogFormat::Pretty) => {
            let fmt_layer = fmt::layer()
                .pretty()
                .with_target(config.show_target)
                .with_thread_ids(config.show_thread_ids)
                .with_ansi(ansi);
            tracing_subscriber::registry().with(filter).with(fmt_layer).try_init()
        }
        (None, LogFormat::Compact) => {
            let fmt_layer = fmt::layer()
                .compact()
                .with_target(config.show_target)
                .with_thread_ids(config.show_thread_ids)
                .with_ansi(ansi);
            tracing_subscriber::registry().with(filter).with(fmt_layer).try_init()
        }
    };
    result.map_err(|e| LoggingError::Init(e.to_string()))?;

    tracing::info!(
        environment = ?config.environment,
        level = ?config.level,
        format = ?config.format,
        "Logging system initialized"
    );
    Ok(())
}

/// 容器中的日志服务：带通道名的 tracing 事件
#[derive(Debug, Clone)]
pub struct Logger {
    channel: String,
}

impl Logger {
    pub fn new(channel: impl Into<String>) -> Self {
        Self { channel: channel.into() }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn debug(&self, message: &str) {
        tracing::debug!(channel = %self.channel, "{}", message);
    }

    pub fn info(&self, message: &str) {
        tracing::info!(channel = %self.channel, "{}", message);
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(channel = %self.channel, "{}", message);
    }

    pub fn error(&self, message: &str) {
        tracing::error!(channel = %self.channel, "{}", message);
    }
}

/// 操作性能计时器
pub struct OperationTimer {
    start: Instant,
    operation: String,
    metadata: Vec<(String, String)>,
}

impl OperationTimer {
    /// 创建新的计时器
    pub fn new(operation: &str) -> Self {
        Self {
            start: Instant::now(),
            operation: operation.to_string(),
            metadata: Vec::new(),
        }
    }

    /// 添加元数据
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.push((key.to_string(), value.to_string()));
        self
    }

    /// 完成计时并记录日志
    pub fn finish(self) {
        tracing::info!(
            operation = %self.operation,
            duration_ms = self.start.elapsed().as_millis() as u64,
            metadata = ?self.metadata,
            "Operation completed"
        );
    }

    /// 获取当前经过时间
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_logging_config_creation() {
        let dev_config = LoggingConfig::development();
        assert_eq!(dev_config.environment, LoggingEnvironment::Development);
        assert_eq!(dev_config.level, Level::DEBUG);
        assert_eq!(dev_config.format, LogFormat::Pretty);

        let test_config = LoggingConfig::testing();
        assert_eq!(test_config.environment, LoggingEnvironment::Testing);
        assert_eq!(test_config.format, LogFormat::Compact);
    }

    #[test]
    fn test_config_from_settings() {
        let mut settings = Settings::default();
        assert_eq!(LoggingConfig::from_settings(&settings).level, Level::ERROR);

        settings.env = "production".to_string();
        settings.logger.level = Some("notice".to_string());
        settings.logger.file = Some(PathBuf::from("/tmp/app.log"));
        let config = LoggingConfig::from_settings(&settings);
        assert_eq!(config.environment, LoggingEnvironment::Production);
        assert_eq!(config.level, Level::INFO);
        assert_eq!(config.file_output, Some(PathBuf::from("/tmp/app.log")));
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("WARNING"), Some(Level::WARN));
        assert_eq!(parse_level("critical"), Some(Level::ERROR));
        assert_eq!(parse_level("verbose"), None);
    }

    #[test]
    fn test_operation_timer() {
        let timer = OperationTimer::new("test_operation").with_metadata("route", "/ping");

        assert_eq!(timer.operation, "test_operation");
        assert_eq!(timer.metadata, vec![("route".to_string(), "/ping".to_string())]);

        std::thread::sleep(Duration::from_millis(1));
        assert!(timer.elapsed().as_nanos() > 0);
        timer.finish();
    }

    #[test]
    fn test_logger_channel() {
        let logger = Logger::new("app");
        assert_eq!(logger.channel(), "app");
        logger.info("channel logger works without a subscriber");
    }
}
