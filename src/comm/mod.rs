/// 通用模块：配置加载、配置校验与日志初始化
/// Common module: configuration, validation and tracing

pub mod config;
pub mod config_validator;
pub mod tracing;

// 重新导出主要的公共接口
pub use config::{ConfigError, ConfigManager, ConfigSource};
pub use config_validator::{AppSettings, SettingsValidator, StoreBackend};
