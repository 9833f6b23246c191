use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::comm::config::{ConfigError, ConfigManager};
use crate::error::{AppError, AppResult};
use crate::feed::{DeliveryStrategy, FeedLimits};
use crate::store::s3::S3Settings;
use crate::store::MAX_LIST_KEYS;

/// 默认上传大小上限 32 MiB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

const ALLOWED_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// 对象存储后端
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    S3,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s3" | "r2" => Ok(StoreBackend::S3),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("未知的存储后端 '{}'，可选: s3, memory", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub account_id: Option<String>,
    pub access_key_id: Option<String>,
    #[serde(skip_serializing)]
    pub secret_key: Option<String>,
    pub bucket: Option<String>,
    pub public_base_url: Option<String>,
    pub endpoint: Option<String>,
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSettings {
    pub strategy: DeliveryStrategy,
    pub default_limit: usize,
    pub max_page_size: usize,
    pub max_cached_keys: usize,
    pub record_uploads: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSettings {
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(skip_serializing)]
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsSettings {
    pub allowed_origin: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub json_format: bool,
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    pub server: ServerSettings,
    pub store: StoreSettings,
    pub feed: FeedSettings,
    pub upload: UploadSettings,
    pub database: DatabaseSettings,
    pub cors: CorsSettings,
    pub logging: LoggingSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 8080,
                workers: None,
            },
            store: StoreSettings {
                backend: StoreBackend::S3,
                account_id: None,
                access_key_id: None,
                secret_key: None,
                bucket: None,
                public_base_url: None,
                endpoint: None,
                region: "auto".to_string(),
            },
            feed: FeedSettings {
                strategy: DeliveryStrategy::default(),
                default_limit: 5,
                max_page_size: 100,
                max_cached_keys: MAX_LIST_KEYS,
                record_uploads: true,
            },
            upload: UploadSettings {
                max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            },
            database: DatabaseSettings {
                url: None,
                max_connections: 5,
            },
            cors: CorsSettings {
                allowed_origin: "*".to_string(),
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppSettings {
    /// 从配置管理器读取，缺失项使用默认值
    pub fn from_manager(manager: &ConfigManager) -> Result<Self, ConfigError> {
        let d = Self::default();

        let strategy = match manager.get_optional_string("feed.strategy")? {
            Some(raw) => parse_key(&raw, "feed.strategy")?,
            None => d.feed.strategy,
        };
        let backend = match manager.get_optional_string("store.backend")? {
            Some(raw) => parse_key(&raw, "store.backend")?,
            None => d.store.backend,
        };

        Ok(Self {
            server: ServerSettings {
                host: manager.get_or("server.host", d.server.host)?,
                port: manager.get_or("server.port", d.server.port)?,
                workers: manager.get_or("server.workers", d.server.workers)?,
            },
            store: StoreSettings {
                backend,
                account_id: manager.get_optional_string("store.account_id")?,
                access_key_id: manager.get_optional_string("store.access_key_id")?,
                secret_key: manager.get_optional_string("store.secret_key")?,
                bucket: manager.get_optional_string("store.bucket")?,
                public_base_url: manager.get_optional_string("store.public_base_url")?,
                endpoint: manager.get_optional_string("store.endpoint")?,
                region: manager.get_or("store.region", d.store.region)?,
            },
            feed: FeedSettings {
                strategy,
                default_limit: manager.get_or("feed.default_limit", d.feed.default_limit)?,
                max_page_size: manager.get_or("feed.max_page_size", d.feed.max_page_size)?,
                max_cached_keys: manager
                    .get_or("feed.max_cached_keys", d.feed.max_cached_keys)?,
                record_uploads: manager.get_or("feed.record_uploads", d.feed.record_uploads)?,
            },
            upload: UploadSettings {
                max_bytes: manager.get_or("upload.max_bytes", d.upload.max_bytes)?,
            },
            database: DatabaseSettings {
                url: manager.get_optional_string("database.url")?,
                max_connections: manager
                    .get_or("database.max_connections", d.database.max_connections)?,
            },
            cors: CorsSettings {
                allowed_origin: manager
                    .get_optional_string("cors.allowed_origin")?
                    .unwrap_or(d.cors.allowed_origin),
            },
            logging: LoggingSettings {
                level: manager
                    .get_optional_string("logging.level")?
                    .map(|l| l.to_ascii_lowercase())
                    .unwrap_or(d.logging.level),
                json_format: manager.get_or("logging.json_format", d.logging.json_format)?,
            },
        })
    }

    /// feed 的 limit 参数
    pub fn feed_limits(&self) -> FeedLimits {
        FeedLimits {
            default_limit: self.feed.default_limit,
            max_page_size: self.feed.max_page_size,
        }
    }

    /// S3 连接参数；校验通过后对 s3 后端总是返回 Some
    pub fn s3_settings(&self) -> Option<S3Settings> {
        let store = &self.store;
        Some(S3Settings {
            account_id: store.account_id.clone()?,
            access_key_id: store.access_key_id.clone()?,
            secret_key: store.secret_key.clone()?,
            bucket: store.bucket.clone()?,
            region: store.region.clone(),
            endpoint: store.endpoint.clone(),
        })
    }

    /// 是否启用投票接口
    pub fn voting_enabled(&self) -> bool {
        self.database.url.is_some()
    }
}

fn parse_key<T>(raw: &str, key: &str) -> Result<T, ConfigError>
where
    T: FromStr<Err = String>,
{
    raw.parse().map_err(|message| ConfigError::TypeConversionError {
        key: key.to_string(),
        message,
    })
}

/// 配置验证器
pub struct SettingsValidator {
    url_pattern: Regex,
}

impl SettingsValidator {
    pub fn new() -> AppResult<Self> {
        let url_pattern = Regex::new(r"^https?://[^\s/]+")
            .map_err(|e| AppError::validation("url_pattern", format!("正则表达式错误: {}", e)))?;
        Ok(Self { url_pattern })
    }

    /// 验证整个配置，返回第一个错误
    pub fn validate(&self, settings: &AppSettings) -> AppResult<()> {
        self.validate_server(settings)?;
        self.validate_store(settings)?;
        self.validate_feed(settings)?;

        if settings.upload.max_bytes == 0 {
            return Err(AppError::validation("upload.max_bytes", "上传大小上限必须大于 0"));
        }

        let max_conn = settings.database.max_connections;
        if max_conn == 0 || max_conn > 100 {
            return Err(AppError::validation(
                "database.max_connections",
                "数据库连接池大小必须在1-100范围内",
            ));
        }

        if settings.cors.allowed_origin.trim().is_empty() {
            return Err(AppError::validation("cors.allowed_origin", "CORS 来源不能为空"));
        }

        if !ALLOWED_LOG_LEVELS.contains(&settings.logging.level.as_str()) {
            return Err(AppError::validation(
                "logging.level",
                format!("值必须是以下之一: {}", ALLOWED_LOG_LEVELS.join(", ")),
            ));
        }

        Ok(())
    }

    fn validate_server(&self, settings: &AppSettings) -> AppResult<()> {
        let server = &settings.server;
        if server.host.trim().is_empty() {
            return Err(AppError::validation("server.host", "服务器主机不能为空"));
        }
        if server.port == 0 {
            return Err(AppError::validation("server.port", "端口必须在1-65535范围内"));
        }
        if let Some(workers) = server.workers {
            if workers == 0 || workers > 64 {
                return Err(AppError::validation("server.workers", "工作线程数必须在1-64范围内"));
            }
        }
        Ok(())
    }

    fn validate_store(&self, settings: &AppSettings) -> AppResult<()> {
        let store = &settings.store;

        if store.backend == StoreBackend::S3 {
            let required = [
                ("store.account_id", &store.account_id),
                ("store.access_key_id", &store.access_key_id),
                ("store.secret_key", &store.secret_key),
                ("store.bucket", &store.bucket),
            ];
            for (key, value) in required {
                if value.is_none() {
                    return Err(AppError::validation(key, "必需的配置项未设置"));
                }
            }
        }

        match &store.public_base_url {
            Some(url) if !self.url_pattern.is_match(url) => {
                return Err(AppError::validation(
                    "store.public_base_url",
                    "必须是 http(s) 地址",
                ));
            }
            None if settings.feed.strategy != DeliveryStrategy::Paginated => {
                return Err(AppError::validation(
                    "store.public_base_url",
                    "除 paginated 策略外必须设置",
                ));
            }
            _ => {}
        }

        if let Some(endpoint) = &store.endpoint {
            if !self.url_pattern.is_match(endpoint) {
                return Err(AppError::validation("store.endpoint", "必须是 http(s) 地址"));
            }
        }

        Ok(())
    }

    fn validate_feed(&self, settings: &AppSettings) -> AppResult<()> {
        let feed = &settings.feed;
        if feed.default_limit == 0 {
            return Err(AppError::validation("feed.default_limit", "默认数量必须大于 0"));
        }
        if feed.max_page_size == 0 || feed.max_page_size > MAX_LIST_KEYS {
            return Err(AppError::validation(
                "feed.max_page_size",
                format!("单页上限必须在1-{}范围内", MAX_LIST_KEYS),
            ));
        }
        if feed.max_cached_keys == 0 || feed.max_cached_keys > MAX_LIST_KEYS {
            return Err(AppError::validation(
                "feed.max_cached_keys",
                format!("缓存数量必须在1-{}范围内", MAX_LIST_KEYS),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::config::ConfigSource;
    use config::FileFormat;

    fn valid_settings() -> AppSettings {
        let mut settings = AppSettings::default();
        settings.store.account_id = Some("acct".into());
        settings.store.access_key_id = Some("id".into());
        settings.store.secret_key = Some("secret".into());
        settings.store.bucket = Some("cats".into());
        settings.store.public_base_url = Some("https://cdn.example.com".into());
        settings
    }

    fn field_of(err: AppError) -> String {
        match err {
            AppError::Validation { field, .. } => field,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_valid_settings() {
        let validator = SettingsValidator::new().unwrap();
        assert!(validator.validate(&valid_settings()).is_ok());
    }

    #[test]
    fn test_missing_credentials() {
        let validator = SettingsValidator::new().unwrap();
        let mut settings = valid_settings();
        settings.store.secret_key = None;
        assert_eq!(
            field_of(validator.validate(&settings).unwrap_err()),
            "store.secret_key"
        );

        settings.store.backend = StoreBackend::Memory;
        assert!(validator.validate(&settings).is_ok());
    }

    #[test]
    fn test_public_base_url_optional_only_when_paginated() {
        let validator = SettingsValidator::new().unwrap();
        let mut settings = valid_settings();
        settings.store.public_base_url = None;
        assert_eq!(
            field_of(validator.validate(&settings).unwrap_err()),
            "store.public_base_url"
        );

        settings.feed.strategy = DeliveryStrategy::Paginated;
        assert!(validator.validate(&settings).is_ok());

        settings.store.public_base_url = Some("cdn.example.com".into());
        assert!(validator.validate(&settings).is_err());
    }

    #[test]
    fn test_invalid_ranges() {
        let validator = SettingsValidator::new().unwrap();

        let mut settings = valid_settings();
        settings.server.workers = Some(65);
        assert_eq!(field_of(validator.validate(&settings).unwrap_err()), "server.workers");

        let mut settings = valid_settings();
        settings.feed.max_cached_keys = 1001;
        assert_eq!(
            field_of(validator.validate(&settings).unwrap_err()),
            "feed.max_cached_keys"
        );

        let mut settings = valid_settings();
        settings.logging.level = "verbose".into();
        assert_eq!(field_of(validator.validate(&settings).unwrap_err()), "logging.level");
    }

    #[test]
    fn test_from_manager_reads_layers() {
        let manager = ConfigManager::with_sources(vec![
            ConfigSource::String {
                content: r#"
                    [server]
                    port = 9000
                    [feed]
                    strategy = "random"
                    default_limit = 3
                    [store]
                    backend = "memory"
                "#
                .to_string(),
                format: FileFormat::Toml,
            },
            ConfigSource::Overrides(vec![
                ("store.bucket".into(), "cats".into()),
                ("logging.level".into(), "DEBUG".into()),
            ]),
        ])
        .unwrap();

        let settings = AppSettings::from_manager(&manager).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.feed.strategy, DeliveryStrategy::Random);
        assert_eq!(settings.feed.default_limit, 3);
        assert_eq!(settings.feed.max_page_size, 100);
        assert_eq!(settings.store.backend, StoreBackend::Memory);
        assert_eq!(settings.store.bucket.as_deref(), Some("cats"));
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(settings.cors.allowed_origin, "*");
        assert!(!settings.voting_enabled());
        assert!(settings.s3_settings().is_none());
    }

    #[test]
    fn test_unknown_strategy_is_config_error() {
        let manager = ConfigManager::with_sources(vec![ConfigSource::Overrides(vec![(
            "feed.strategy".into(),
            "chronological".into(),
        )])])
        .unwrap();
        assert!(matches!(
            AppSettings::from_manager(&manager),
            Err(ConfigError::TypeConversionError { .. })
        ));
    }
}
