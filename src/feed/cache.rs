use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, instrument};

use crate::store::{list_up_to, ObjectStore, StoreError, MAX_LIST_KEYS};

/// Feed 缓存：对象键 -> 公开 URL
///
/// 启动时从对象存储加载，之后只增不减（刷新或上传成功后合并）。
/// 读多写少，使用读写锁；锁内只做内存拷贝/合并，不做 I/O。
pub struct FeedCache {
    store: Arc<dyn ObjectStore>,
    public_base_url: String,
    max_keys: usize,
    entries: RwLock<HashMap<String, String>>,
}

impl FeedCache {
    /// 创建空缓存
    ///
    /// `max_keys` 为单次加载/刷新列举的上限，最大 1000。
    pub fn new(store: Arc<dyn ObjectStore>, public_base_url: &str, max_keys: usize) -> Self {
        Self {
            store,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            max_keys: max_keys.clamp(1, MAX_LIST_KEYS),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// 对象键对应的公开 URL
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    /// 启动加载，返回缓存条目数
    ///
    /// 调用方应把错误视为致命错误。
    #[instrument(skip(self), fields(max_keys = self.max_keys))]
    pub async fn load(&self) -> Result<usize, StoreError> {
        let count = self.merge_listing().await?;
        info!("启动时加载了 {} 个 feed URL", count);
        Ok(count)
    }

    /// 重新列举并合并新出现的键，返回合并后的总数
    ///
    /// 已存在的条目保持不变，不会删除任何条目。
    pub async fn refresh(&self) -> Result<usize, StoreError> {
        let before = self.len();
        let count = self.merge_listing().await?;
        info!(added = count.saturating_sub(before), total = count, "feed 缓存已刷新");
        Ok(count)
    }

    /// 写入单个条目（上传成功后立即可见）
    pub fn record(&self, key: &str, url: String) {
        self.entries.write().insert(key.to_string(), url);
    }

    /// 当前所有 URL 的快照
    pub fn urls(&self) -> Vec<String> {
        self.entries.read().values().cloned().collect()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    async fn merge_listing(&self) -> Result<usize, StoreError> {
        // 先在锁外完成列举
        let keys = list_up_to(self.store.as_ref(), self.max_keys).await?;

        let mut entries = self.entries.write();
        for key in keys {
            if !entries.contains_key(&key) {
                let url = self.public_url(&key);
                entries.insert(key, url);
            }
        }
        Ok(entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryObjectStore;

    fn cache_over(store: Arc<MemoryObjectStore>, max_keys: usize) -> FeedCache {
        FeedCache::new(store, "https://pub.example.dev/", max_keys)
    }

    #[tokio::test]
    async fn test_load_builds_public_urls() {
        let store = Arc::new(MemoryObjectStore::with_keys(["a.jpg", "b.jpg"]));
        let cache = cache_over(store, 1000);

        assert_eq!(cache.load().await.unwrap(), 2);
        assert_eq!(
            cache.get("a.jpg").as_deref(),
            Some("https://pub.example.dev/a.jpg")
        );
        let mut urls = cache.urls();
        urls.sort();
        assert_eq!(
            urls,
            vec!["https://pub.example.dev/a.jpg", "https://pub.example.dev/b.jpg"]
        );
    }

    #[tokio::test]
    async fn test_load_skips_empty_keys() {
        let store = Arc::new(MemoryObjectStore::with_keys(["", "a.jpg"]));
        let cache = cache_over(store, 1000);

        assert_eq!(cache.load().await.unwrap(), 1);
        assert_eq!(cache.urls(), vec!["https://pub.example.dev/a.jpg"]);
        assert_eq!(cache.get(""), None);
    }

    #[tokio::test]
    async fn test_load_respects_cap() {
        let store = Arc::new(MemoryObjectStore::with_keys(
            (0..1500).map(|i| format!("{:05}.jpg", i)),
        ));
        let cache = cache_over(store.clone(), 5000);
        assert_eq!(cache.load().await.unwrap(), 1000);

        let small = cache_over(store, 3);
        assert_eq!(small.load().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_load_failure_is_reported() {
        let store = Arc::new(MemoryObjectStore::with_keys(["a.jpg"]));
        store.fail_listing(true);
        let cache = cache_over(store, 1000);
        assert!(cache.load().await.is_err());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_merges_without_removing() {
        let store = Arc::new(MemoryObjectStore::with_keys(["a.jpg"]));
        let cache = cache_over(store.clone(), 1000);
        cache.load().await.unwrap();

        // 手动记录的条目不在存储里，刷新后仍应保留
        cache.record("local.jpg", "https://elsewhere/local.jpg".to_string());
        store.insert_key("b.jpg");

        assert_eq!(cache.refresh().await.unwrap(), 3);
        assert!(cache.get("b.jpg").is_some());
        assert_eq!(
            cache.get("local.jpg").as_deref(),
            Some("https://elsewhere/local.jpg")
        );

        // 再次刷新不会重复计数
        assert_eq!(cache.refresh().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_entries() {
        let store = Arc::new(MemoryObjectStore::with_keys(["a.jpg", "b.jpg"]));
        let cache = cache_over(store.clone(), 1000);
        cache.load().await.unwrap();

        store.fail_listing(true);
        assert!(cache.refresh().await.is_err());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_record_overwrites() {
        let cache = cache_over(Arc::new(MemoryObjectStore::new()), 1000);
        cache.record("x.jpg", "one".to_string());
        cache.record("x.jpg", "two".to_string());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("x.jpg").as_deref(), Some("two"));
    }
}
