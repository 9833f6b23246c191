use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::de::DeserializeOwned;
use tracing::debug;

/// 环境变量前缀，例如 `FEED__SERVER__PORT=9000`
pub const ENV_PREFIX: &str = "FEED";

/// 环境变量层级分隔符
pub const ENV_SEPARATOR: &str = "__";

/// 编译进二进制的默认配置，缺少 `config/` 目录时也能启动
const BUILTIN_DEFAULTS: &str = include_str!("../../config/default.toml");

/// 选择 `config/<profile>.toml` 的环境变量
pub const PROFILE_ENV: &str = "FEED_ENV";

/// 部署时沿用的扁平环境变量及其对应的配置键
pub const LEGACY_ENV_ALIASES: &[(&str, &str)] = &[
    ("R2_ACCOUNT_ID", "store.account_id"),
    ("R2_ACCESS_KEY_ID", "store.access_key_id"),
    ("R2_ACCESS_KEY_SECRET", "store.secret_key"),
    ("R2_BUCKET", "store.bucket"),
    ("R2_PUBLIC_BASE_URL", "store.public_base_url"),
    ("R2_ENDPOINT", "store.endpoint"),
    ("DATABASE_URL", "database.url"),
    ("CORS_ORIGIN", "cors.allowed_origin"),
    ("PORT", "server.port"),
    ("LOG_LEVEL", "logging.level"),
];

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },
    #[error("配置格式错误: {message}")]
    FormatError { message: String },
    #[error("配置项 '{key}' 不存在")]
    KeyNotFound { key: String },
    #[error("配置项 '{key}' 类型转换失败: {message}")]
    TypeConversionError { key: String, message: String },
    #[error("环境变量配置错误: {message}")]
    EnvironmentError { message: String },
    #[error("配置初始化失败: {message}")]
    InitializationError { message: String },
}

/// 配置数据源信息
#[derive(Debug, Clone)]
pub struct ConfigSourceInfo {
    pub source_type: String,
    pub description: String,
    pub priority: u8,
    pub loaded: bool,
}

/// 配置管理器
pub struct ConfigManager {
    config: Config,
    sources_info: Vec<ConfigSourceInfo>,
}

impl ConfigManager {
    /// 按标准分层加载：内置默认值 -> 默认文件 -> 环境文件 -> local -> FEED__ 环境变量 -> 扁平环境变量 -> 命令行
    ///
    /// 后添加的配置源优先生效。
    pub fn load(
        profile: &str,
        cli_overrides: Vec<(String, String)>,
    ) -> Result<Self, ConfigError> {
        let mut sources = vec![ConfigSource::String {
            content: BUILTIN_DEFAULTS.to_string(),
            format: FileFormat::Toml,
        }];
        sources.extend(
            profile_config_paths(profile)
                .into_iter()
                .map(|path| ConfigSource::File {
                    path,
                    format: Some(FileFormat::Toml),
                    required: false,
                }),
        );

        sources.push(ConfigSource::Env {
            prefix: ENV_PREFIX.to_string(),
            separator: ENV_SEPARATOR,
        });
        sources.push(ConfigSource::Overrides(legacy_env_overrides(|name| {
            std::env::var(name).ok()
        })));
        sources.push(ConfigSource::Overrides(cli_overrides));

        Self::with_sources(sources)
    }

    /// 使用指定的配置源创建配置管理器
    pub fn with_sources(sources: Vec<ConfigSource>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        let mut sources_info = Vec::new();

        for (index, source) in sources.into_iter().enumerate() {
            let priority = u8::try_from(index + 1).unwrap_or(u8::MAX);
            let info = source.get_source_info(priority);

            // 可选文件不存在时只记录，不加入构建器
            if let ConfigSource::File { path, required, .. } = &source {
                if !std::path::Path::new(path).exists() {
                    if *required {
                        return Err(ConfigError::FileNotFound { path: path.clone() });
                    }
                    debug!("跳过不存在的配置文件: {}", path);
                    sources_info.push(info);
                    continue;
                }
            }

            builder = source.add_to_builder(builder)?;
            sources_info.push(ConfigSourceInfo {
                loaded: true,
                ..info
            });
        }

        let config = builder
            .build()
            .map_err(|e| ConfigError::InitializationError {
                message: e.to_string(),
            })?;

        Ok(Self {
            config,
            sources_info,
        })
    }

    /// 获取指定 key 的配置值
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        self.config.get(key).map_err(|e| match e {
            config::ConfigError::NotFound(_) => ConfigError::KeyNotFound {
                key: key.to_string(),
            },
            other => ConfigError::TypeConversionError {
                key: key.to_string(),
                message: other.to_string(),
            },
        })
    }

    /// 获取指定 key 的配置值；缺失时返回默认值，类型错误仍然报错
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            Ok(value) => Ok(value),
            Err(ConfigError::KeyNotFound { .. }) => Ok(default),
            Err(e) => Err(e),
        }
    }

    /// 获取可选配置值，空字符串视为未设置
    pub fn get_optional_string(&self, key: &str) -> Result<Option<String>, ConfigError> {
        match self.get::<String>(key) {
            Ok(value) if value.trim().is_empty() => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(ConfigError::KeyNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// 获取字符串配置值
    pub fn get_string(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)
    }

    /// 获取所有配置源信息
    pub fn sources_info(&self) -> &[ConfigSourceInfo] {
        &self.sources_info
    }

    /// 获取配置源统计信息 (总数, 已加载, 未加载)
    pub fn sources_stats(&self) -> (usize, usize, usize) {
        let total = self.sources_info.len();
        let loaded = self.sources_info.iter().filter(|info| info.loaded).count();
        (total, loaded, total - loaded)
    }
}

/// 配置源类型
pub enum ConfigSource {
    /// 文件配置源
    File {
        path: String,
        format: Option<FileFormat>,
        required: bool,
    },
    /// 环境变量配置源
    Env {
        prefix: String,
        separator: &'static str,
    },
    /// 字符串配置源
    String { content: String, format: FileFormat },
    /// 按点分路径覆盖的键值对
    Overrides(Vec<(String, String)>),
}

impl ConfigSource {
    /// 获取配置源信息
    pub fn get_source_info(&self, priority: u8) -> ConfigSourceInfo {
        let (source_type, description) = match self {
            ConfigSource::File { path, required, .. } => (
                "File",
                format!("文件配置源: {} (必需: {})", path, required),
            ),
            ConfigSource::Env { prefix, separator } => (
                "Environment",
                format!("环境变量配置源: 前缀={}, 分隔符={}", prefix, separator),
            ),
            ConfigSource::String { .. } => ("String", "字符串配置源".to_string()),
            ConfigSource::Overrides(pairs) => {
                ("Overrides", format!("覆盖配置源: {} 个配置项", pairs.len()))
            }
        };
        ConfigSourceInfo {
            source_type: source_type.to_string(),
            description,
            priority,
            loaded: false,
        }
    }

    pub fn add_to_builder(
        self,
        builder: ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        match self {
            ConfigSource::File {
                path,
                format,
                required,
            } => {
                let file_source = match format {
                    Some(format) => File::with_name(&path).format(format),
                    None => File::with_name(&path),
                };
                Ok(builder.add_source(file_source.required(required)))
            }
            ConfigSource::Env { prefix, separator } => Ok(builder.add_source(
                Environment::with_prefix(&prefix)
                    .prefix_separator(separator)
                    .separator(separator)
                    .ignore_empty(true),
            )),
            ConfigSource::String { content, format } => {
                Ok(builder.add_source(File::from_str(&content, format)))
            }
            ConfigSource::Overrides(pairs) => {
                pairs.into_iter().try_fold(builder, |builder, (key, value)| {
                    builder
                        .set_override(key.as_str(), value)
                        .map_err(|e| ConfigError::FormatError {
                            message: format!("覆盖配置 '{}' 失败: {}", key, e),
                        })
                })
            }
        }
    }
}

/// 当前环境名，默认 `development`
pub fn current_profile() -> String {
    std::env::var(PROFILE_ENV)
        .ok()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| "development".to_string())
}

/// 环境特定的配置文件路径，按优先级从低到高
pub fn profile_config_paths(profile: &str) -> Vec<String> {
    vec![
        "config/default.toml".to_string(),
        format!("config/{}.toml", profile),
        "config/local.toml".to_string(),
    ]
}

/// 把扁平环境变量映射为配置覆盖，空值忽略
pub fn legacy_env_overrides<F>(lookup: F) -> Vec<(String, String)>
where
    F: Fn(&str) -> Option<String>,
{
    LEGACY_ENV_ALIASES
        .iter()
        .filter_map(|(name, key)| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .map(|value| (key.to_string(), value))
        })
        .collect()
}

/// 加载工作目录下的 `.env`；文件不存在不算错误
pub fn load_dotenv() -> Result<(), ConfigError> {
    match dotenvy::dotenv() {
        Ok(path) => {
            debug!("已加载 {}", path.display());
            Ok(())
        }
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(ConfigError::EnvironmentError {
            message: format!(".env 解析失败: {}", e),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn toml(content: &str) -> ConfigSource {
        ConfigSource::String {
            content: content.to_string(),
            format: FileFormat::Toml,
        }
    }

    #[test]
    fn test_config_from_string() {
        let manager = ConfigManager::with_sources(vec![toml("[server]\nport = 8080")]).unwrap();
        assert_eq!(manager.get::<i64>("server.port").unwrap(), 8080);
    }

    #[test]
    fn test_later_sources_win() {
        let manager = ConfigManager::with_sources(vec![
            toml("[server]\nport = 8080\nhost = \"0.0.0.0\""),
            ConfigSource::Overrides(vec![("server.port".into(), "9090".into())]),
        ])
        .unwrap();
        assert_eq!(manager.get::<u16>("server.port").unwrap(), 9090);
        assert_eq!(manager.get_string("server.host").unwrap(), "0.0.0.0");
    }

    #[test]
    fn test_missing_key_vs_bad_type() {
        let manager = ConfigManager::with_sources(vec![toml("[server]\nport = \"abc\"")]).unwrap();
        assert!(matches!(
            manager.get::<u16>("server.nope"),
            Err(ConfigError::KeyNotFound { .. })
        ));
        assert_eq!(manager.get_or::<u16>("server.nope", 7).unwrap(), 7);
        assert!(matches!(
            manager.get_or::<u16>("server.port", 7),
            Err(ConfigError::TypeConversionError { .. })
        ));
    }

    #[test]
    fn test_optional_string_treats_blank_as_unset() {
        let manager = ConfigManager::with_sources(vec![toml(
            "[store]\npublic_base_url = \"  \"\nbucket = \"cats\"",
        )])
        .unwrap();
        assert_eq!(manager.get_optional_string("store.public_base_url").unwrap(), None);
        assert_eq!(manager.get_optional_string("store.endpoint").unwrap(), None);
        assert_eq!(
            manager.get_optional_string("store.bucket").unwrap(),
            Some("cats".to_string())
        );
    }

    #[test]
    fn test_missing_optional_file_is_recorded() {
        let manager = ConfigManager::with_sources(vec![ConfigSource::File {
            path: "config/definitely-not-here.toml".to_string(),
            format: Some(FileFormat::Toml),
            required: false,
        }])
        .unwrap();
        assert_eq!(manager.sources_stats(), (1, 0, 1));
    }

    #[test]
    fn test_missing_required_file_fails() {
        let result = ConfigManager::with_sources(vec![ConfigSource::File {
            path: "config/definitely-not-here.toml".to_string(),
            format: Some(FileFormat::Toml),
            required: true,
        }]);
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_legacy_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("R2_BUCKET", "cats"),
            ("PORT", "3000"),
            ("R2_ENDPOINT", ""),
            ("UNRELATED", "x"),
        ]
        .into_iter()
        .collect();

        let mut overrides = legacy_env_overrides(|name| env.get(name).map(|v| v.to_string()));
        overrides.sort();
        assert_eq!(
            overrides,
            vec![
                ("server.port".to_string(), "3000".to_string()),
                ("store.bucket".to_string(), "cats".to_string()),
            ]
        );
    }

    #[test]
    fn test_builtin_defaults_fill_missing_files() {
        let manager = ConfigManager::load(
            "definitely-not-a-profile",
            vec![("server.port".into(), "9100".into())],
        )
        .unwrap();
        assert_eq!(manager.get::<u16>("server.port").unwrap(), 9100);
        assert_eq!(manager.get_string("feed.strategy").unwrap(), "per-client");

        let (total, loaded, skipped) = manager.sources_stats();
        assert_eq!(total, 7);
        assert_eq!(loaded + skipped, total);
        assert!(manager.sources_info()[0].loaded);
        assert_eq!(manager.sources_info()[0].source_type, "String");
    }

    #[test]
    fn test_profile_paths_order() {
        assert_eq!(
            profile_config_paths("production"),
            vec![
                "config/default.toml",
                "config/production.toml",
                "config/local.toml"
            ]
        );
    }
}
