use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use super::cache::FeedCache;
use super::sampler::sample_from;
use super::seen::ClientSeenRegistry;
use crate::error::{AppError, AppResult};
use crate::store::ObjectStore;

/// 下发策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryStrategy {
    /// 无状态随机抽样
    Random,
    /// 直接按对象存储的续传标记分页
    Paginated,
    /// 按客户端去重的随机抽样，看完一轮后重置
    #[default]
    PerClient,
}

impl DeliveryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStrategy::Random => "random",
            DeliveryStrategy::Paginated => "paginated",
            DeliveryStrategy::PerClient => "per-client",
        }
    }
}

impl fmt::Display for DeliveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(DeliveryStrategy::Random),
            "paginated" | "cursor" => Ok(DeliveryStrategy::Paginated),
            "per-client" | "per_client" | "dedup" => Ok(DeliveryStrategy::PerClient),
            other => Err(format!(
                "未知的下发策略: {} (可选: random, paginated, per-client)",
                other
            )),
        }
    }
}

/// limit 相关参数
#[derive(Debug, Clone, Copy)]
pub struct FeedLimits {
    /// 未指定或非正数时使用的默认值
    pub default_limit: usize,
    /// 分页策略下单页上限
    pub max_page_size: usize,
}

impl Default for FeedLimits {
    fn default() -> Self {
        Self {
            default_limit: 5,
            max_page_size: 100,
        }
    }
}

/// 一次 feed 请求
#[derive(Debug, Clone, Default)]
pub struct FeedQuery {
    pub limit: Option<i64>,
    pub key: Option<String>,
    pub cursor: Option<String>,
}

impl FeedQuery {
    /// 解析原始 limit 参数；无法解析时视为未指定
    pub fn parse_limit(raw: Option<&str>) -> Option<i64> {
        raw.and_then(|s| s.trim().parse::<i64>().ok())
    }
}

/// feed 响应
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FeedPage {
    pub urls: Vec<String>,
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none", default)]
    pub next_cursor: Option<String>,
}

impl FeedPage {
    fn from_urls(urls: Vec<String>) -> Self {
        Self {
            urls,
            next_cursor: None,
        }
    }
}

/// Feed 服务：按配置的策略决定每次请求返回哪些 URL
pub struct FeedService {
    strategy: DeliveryStrategy,
    limits: FeedLimits,
    cache: Arc<FeedCache>,
    seen: Arc<ClientSeenRegistry>,
    store: Arc<dyn ObjectStore>,
}

impl FeedService {
    pub fn new(
        strategy: DeliveryStrategy,
        limits: FeedLimits,
        cache: Arc<FeedCache>,
        seen: Arc<ClientSeenRegistry>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            strategy,
            limits,
            cache,
            seen,
            store,
        }
    }

    pub fn strategy(&self) -> DeliveryStrategy {
        self.strategy
    }

    /// 处理一次 feed 请求
    pub async fn deliver(&self, query: &FeedQuery) -> AppResult<FeedPage> {
        match self.strategy {
            DeliveryStrategy::Random => Ok(self.random(query)),
            DeliveryStrategy::Paginated => self.paginated(query).await,
            DeliveryStrategy::PerClient => self.per_client(query),
        }
    }

    fn requested_limit(&self, raw: Option<i64>) -> usize {
        match raw {
            Some(n) if n > 0 => n as usize,
            _ => self.limits.default_limit,
        }
    }

    fn random(&self, query: &FeedQuery) -> FeedPage {
        let all = self.cache.urls();
        let limit = self.requested_limit(query.limit).min(all.len());
        let mut rng = rand::thread_rng();
        FeedPage::from_urls(sample_from(&mut rng, &all, limit))
    }

    async fn paginated(&self, query: &FeedQuery) -> AppResult<FeedPage> {
        let limit = self
            .requested_limit(query.limit)
            .clamp(1, self.limits.max_page_size.max(1));
        let cursor = query.cursor.as_deref().filter(|c| !c.is_empty());

        let page = self
            .store
            .list_page(cursor, limit)
            .await
            .map_err(|e| AppError::store("feed", e))?;

        debug!(
            count = page.keys.len(),
            more = page.next_cursor.is_some(),
            "分页 feed"
        );

        Ok(FeedPage {
            urls: page.keys.iter().map(|k| self.cache.public_url(k)).collect(),
            next_cursor: page.next_cursor,
        })
    }

    fn per_client(&self, query: &FeedQuery) -> AppResult<FeedPage> {
        let client = query
            .key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::bad_request("key required"))?;

        let all = self.cache.urls();
        if all.is_empty() {
            return Ok(FeedPage::default());
        }
        let limit = self.requested_limit(query.limit).min(all.len());
        Ok(FeedPage::from_urls(self.seen.select(client, &all, limit)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryObjectStore;
    use std::collections::HashSet;

    async fn service(strategy: DeliveryStrategy, keys: &[&str]) -> FeedService {
        let store: Arc<dyn ObjectStore> =
            Arc::new(MemoryObjectStore::with_keys(keys.iter().copied()));
        let cache = Arc::new(FeedCache::new(store.clone(), "https://pub.test", 1000));
        cache.load().await.unwrap();
        FeedService::new(
            strategy,
            FeedLimits::default(),
            cache,
            Arc::new(ClientSeenRegistry::new()),
            store,
        )
    }

    fn query(limit: Option<i64>, key: Option<&str>, cursor: Option<&str>) -> FeedQuery {
        FeedQuery {
            limit,
            key: key.map(str::to_string),
            cursor: cursor.map(str::to_string),
        }
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("random".parse::<DeliveryStrategy>().unwrap(), DeliveryStrategy::Random);
        assert_eq!(
            "Paginated".parse::<DeliveryStrategy>().unwrap(),
            DeliveryStrategy::Paginated
        );
        assert_eq!(
            "per_client".parse::<DeliveryStrategy>().unwrap(),
            DeliveryStrategy::PerClient
        );
        assert!("round-robin".parse::<DeliveryStrategy>().is_err());
        assert_eq!(DeliveryStrategy::default().to_string(), "per-client");
    }

    #[test]
    fn test_parse_limit() {
        assert_eq!(FeedQuery::parse_limit(Some("7")), Some(7));
        assert_eq!(FeedQuery::parse_limit(Some("abc")), None);
        assert_eq!(FeedQuery::parse_limit(None), None);
    }

    #[test]
    fn test_next_cursor_field_name() {
        let page = FeedPage {
            urls: vec!["u".to_string()],
            next_cursor: Some("c".to_string()),
        };
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["nextCursor"], "c");

        let json = serde_json::to_value(FeedPage::from_urls(vec![])).unwrap();
        assert!(json.get("nextCursor").is_none());
    }

    #[tokio::test]
    async fn test_random_limit_clamping() {
        let svc = service(DeliveryStrategy::Random, &["a", "b", "c", "d", "e", "f", "g"]).await;

        assert_eq!(svc.deliver(&query(None, None, None)).await.unwrap().urls.len(), 5);
        assert_eq!(svc.deliver(&query(Some(0), None, None)).await.unwrap().urls.len(), 5);
        assert_eq!(svc.deliver(&query(Some(-3), None, None)).await.unwrap().urls.len(), 5);
        assert_eq!(svc.deliver(&query(Some(2), None, None)).await.unwrap().urls.len(), 2);

        let all = svc.deliver(&query(Some(50), None, None)).await.unwrap().urls;
        assert_eq!(all.len(), 7);
        let unique: HashSet<_> = all.iter().collect();
        assert_eq!(unique.len(), 7);
    }

    #[tokio::test]
    async fn test_random_ignores_client_key() {
        let svc = service(DeliveryStrategy::Random, &["a", "b"]).await;
        for _ in 0..3 {
            let page = svc.deliver(&query(Some(2), Some("x"), None)).await.unwrap();
            assert_eq!(page.urls.len(), 2);
        }
    }

    #[tokio::test]
    async fn test_paginated_walk_visits_everything_once() {
        let keys: Vec<String> = (0..23).map(|i| format!("p{:02}.jpg", i)).collect();
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let svc = service(DeliveryStrategy::Paginated, &refs).await;

        for page_size in [1i64, 4, 5, 23, 1000] {
            let mut seen = HashSet::new();
            let mut cursor: Option<String> = None;
            loop {
                let page = svc
                    .deliver(&query(Some(page_size), None, cursor.as_deref()))
                    .await
                    .unwrap();
                assert!(page.urls.len() <= 100);
                for url in page.urls {
                    assert!(url.starts_with("https://pub.test/p"));
                    assert!(seen.insert(url));
                }
                match page.next_cursor {
                    Some(next) => cursor = Some(next),
                    None => break,
                }
            }
            assert_eq!(seen.len(), 23);
        }
    }

    #[tokio::test]
    async fn test_paginated_default_and_max_page() {
        let keys: Vec<String> = (0..150).map(|i| format!("{:03}", i)).collect();
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let svc = service(DeliveryStrategy::Paginated, &refs).await;

        let first = svc.deliver(&query(None, None, None)).await.unwrap();
        assert_eq!(first.urls.len(), 5);
        assert!(first.next_cursor.is_some());

        let big = svc.deliver(&query(Some(500), None, None)).await.unwrap();
        assert_eq!(big.urls.len(), 100);
    }

    #[tokio::test]
    async fn test_per_client_requires_key() {
        let svc = service(DeliveryStrategy::PerClient, &["a"]).await;
        let err = svc.deliver(&query(None, None, None)).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        let err = svc.deliver(&query(None, Some(""), None)).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_per_client_empty_cache() {
        let svc = service(DeliveryStrategy::PerClient, &[]).await;
        let page = svc.deliver(&query(Some(3), Some("x"), None)).await.unwrap();
        assert!(page.urls.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_per_client_cycle_through_service() {
        let svc = service(DeliveryStrategy::PerClient, &["a.jpg", "b.jpg", "c.jpg"]).await;

        let first = svc.deliver(&query(Some(2), Some("x"), None)).await.unwrap().urls;
        assert_eq!(first.len(), 2);
        let second = svc.deliver(&query(Some(2), Some("x"), None)).await.unwrap().urls;
        assert_eq!(second.len(), 1);

        let mut union: HashSet<String> = first.into_iter().collect();
        assert!(union.insert(second[0].clone()));
        assert_eq!(union.len(), 3);

        // 请求数大于缓存大小时按缓存大小返回
        let third = svc.deliver(&query(Some(10), Some("y"), None)).await.unwrap().urls;
        assert_eq!(third.len(), 3);
    }
}
