use std::sync::Arc;

use actix_web::{middleware::Logger, web, App, HttpServer};
use tracing::{debug, error, info, instrument};

use crate::api::{configure_routes, AppState};
use crate::comm::config::{current_profile, load_dotenv, ConfigManager};
use crate::comm::config_validator::{AppSettings, SettingsValidator, StoreBackend};
use crate::comm::tracing::init_tracing;
use crate::error::{AppError, AppResult};
use crate::feed::{ClientSeenRegistry, FeedCache, FeedService};
use crate::middleware::{CorsConfig, CorsMiddleware};
use crate::store::{MemoryObjectStore, ObjectStore, S3ObjectStore};
use crate::vote::{PgVoteStore, VoteStore};

/// 加载分层配置
///
/// `.env` -> 内置默认值 -> 配置文件 -> 环境变量 -> 命令行覆盖。
pub fn load_config(cli_overrides: Vec<(String, String)>) -> AppResult<ConfigManager> {
    load_dotenv()?;
    Ok(ConfigManager::load(&current_profile(), cli_overrides)?)
}

/// 读取并校验应用配置
pub fn validated_settings(manager: &ConfigManager) -> AppResult<AppSettings> {
    let settings = AppSettings::from_manager(manager)?;
    SettingsValidator::new()?.validate(&settings)?;
    Ok(settings)
}

/// 应用启动器
pub struct AppBootstrap {
    config: Option<ConfigManager>,
}

impl AppBootstrap {
    /// 创建新的应用启动器
    pub fn new() -> Self {
        Self { config: None }
    }

    /// 设置配置
    pub fn with_config(mut self, config: ConfigManager) -> Self {
        self.config = Some(config);
        self
    }

    /// 运行应用服务器
    #[instrument(skip(self))]
    pub async fn run(self) -> AppResult<()> {
        let config = match self.config {
            Some(config) => config,
            None => load_config(Vec::new())?,
        };
        let settings = validated_settings(&config)?;

        init_tracing(&settings.logging);
        log_config_sources(&config);
        info!(
            strategy = %settings.feed.strategy,
            backend = ?settings.store.backend,
            voting = settings.voting_enabled(),
            "启动应用服务器"
        );

        let state = match Self::build_state(&settings).await {
            Ok(state) => state,
            Err(e) => {
                error!("初始化失败: {}", e);
                return Err(e);
            }
        };

        match Self::start_http_server(&settings, state).await {
            Ok(()) => {
                info!("服务器已停止");
                Ok(())
            }
            Err(e) => {
                error!("服务器启动失败: {}", e);
                Err(e)
            }
        }
    }

    /// 构造对象存储、缓存、下发服务和投票存储
    #[instrument(skip(settings))]
    pub async fn build_state(settings: &AppSettings) -> AppResult<AppState> {
        let store: Arc<dyn ObjectStore> = match settings.store.backend {
            StoreBackend::S3 => {
                let s3 = settings.s3_settings().ok_or_else(|| {
                    AppError::validation("store", "s3 后端缺少连接参数")
                })?;
                Arc::new(
                    S3ObjectStore::connect(&s3)
                        .await
                        .map_err(|e| AppError::store("connect", e))?,
                )
            }
            StoreBackend::Memory => Arc::new(MemoryObjectStore::new()),
        };

        let public_base_url = settings
            .store
            .public_base_url
            .clone()
            .unwrap_or_else(|| store.default_public_base());

        let cache = Arc::new(FeedCache::new(
            store.clone(),
            &public_base_url,
            settings.feed.max_cached_keys,
        ));
        cache
            .load()
            .await
            .map_err(|e| AppError::store("startup listing", e))?;

        let feed = Arc::new(FeedService::new(
            settings.feed.strategy,
            settings.feed_limits(),
            cache.clone(),
            Arc::new(ClientSeenRegistry::new()),
            store.clone(),
        ));

        let votes: Option<Arc<dyn VoteStore>> = match &settings.database.url {
            Some(url) => Some(Arc::new(
                PgVoteStore::connect(url, settings.database.max_connections)
                    .await
                    .map_err(|e| AppError::vote("database connect", e))?,
            )),
            None => {
                info!("未配置数据库，/vote 和 /consensus 不可用");
                None
            }
        };

        Ok(AppState {
            feed,
            cache,
            store,
            votes,
            record_uploads: settings.feed.record_uploads,
            max_upload_bytes: settings.upload.max_bytes,
        })
    }

    /// 启动HTTP服务器
    async fn start_http_server(settings: &AppSettings, state: AppState) -> AppResult<()> {
        let cors = CorsConfig {
            allowed_origin: settings.cors.allowed_origin.clone(),
        };
        let voting_enabled = state.votes.is_some();
        let data = web::Data::new(state);

        let mut server = HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .wrap(CorsMiddleware::new(cors.clone()))
                .wrap(Logger::default())
                .configure(move |cfg| configure_routes(cfg, voting_enabled))
        });
        if let Some(workers) = settings.server.workers {
            server = server.workers(workers);
        }

        let addr = (settings.server.host.as_str(), settings.server.port);
        info!("监听 http://{}:{}", addr.0, addr.1);

        server
            .bind(addr)
            .map_err(|e| AppError::Internal(anyhow::Error::new(e)))?
            .run()
            .await
            .map_err(|e| AppError::Internal(anyhow::Error::new(e)))?;

        Ok(())
    }
}

fn log_config_sources(config: &ConfigManager) {
    let (total, loaded, skipped) = config.sources_stats();
    info!(total, loaded, skipped, "配置源加载完成");
    for source in config.sources_info() {
        debug!(
            priority = source.priority,
            loaded = source.loaded,
            "{}: {}",
            source.source_type,
            source.description
        );
    }
}

impl Default for AppBootstrap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::DeliveryStrategy;

    fn memory_settings() -> AppSettings {
        let mut settings = AppSettings::default();
        settings.store.backend = StoreBackend::Memory;
        settings.store.public_base_url = Some("https://pub.test/".into());
        settings
    }

    #[tokio::test]
    async fn test_build_state_with_memory_backend() {
        let state = AppBootstrap::build_state(&memory_settings()).await.unwrap();
        assert!(state.votes.is_none());
        assert!(state.cache.is_empty());
        assert_eq!(state.cache.public_url("a.jpg"), "https://pub.test/a.jpg");
        assert_eq!(state.feed.strategy(), DeliveryStrategy::PerClient);
        assert_eq!(state.store.backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_build_state_memory_paginated_fallback_base() {
        let mut settings = memory_settings();
        settings.store.public_base_url = None;
        settings.feed.strategy = DeliveryStrategy::Paginated;

        let state = AppBootstrap::build_state(&settings).await.unwrap();
        assert_eq!(
            state.cache.public_url("a.jpg"),
            format!("{}/a.jpg", state.store.default_public_base())
        );
    }
}
