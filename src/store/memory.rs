use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use super::{NewObject, ObjectPage, ObjectStore, StoreError, MAX_LIST_KEYS};

/// 内存中保存的对象
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: String,
}

/// 内存对象存储
///
/// 键按字典序保存，续传标记即下一页的起始键。用于本地开发和测试，
/// 可以通过 [`MemoryObjectStore::fail_listing`] / [`MemoryObjectStore::fail_puts`]
/// 模拟上游故障。
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    fail_listing: AtomicBool,
    fail_puts: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用一组空对象预填充
    pub fn with_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        {
            let mut objects = store.objects.write();
            for key in keys {
                objects.insert(
                    key.into(),
                    StoredObject {
                        body: Bytes::new(),
                        content_type: "application/octet-stream".to_string(),
                    },
                );
            }
        }
        store
    }

    /// 直接写入一个键（绕过上传流程，模拟其他客户端写入）
    pub fn insert_key(&self, key: impl Into<String>) {
        self.objects.write().insert(
            key.into(),
            StoredObject {
                body: Bytes::new(),
                content_type: "application/octet-stream".to_string(),
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list_page(
        &self,
        cursor: Option<&str>,
        max_keys: usize,
    ) -> Result<ObjectPage, StoreError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(StoreError::List("memory store: listing disabled".to_string()));
        }

        let max_keys = max_keys.clamp(1, MAX_LIST_KEYS);
        let objects = self.objects.read();
        let start = match cursor {
            Some(c) => Bound::Included(c.to_string()),
            None => Bound::Unbounded,
        };
        let mut iter = objects
            .range::<String, _>((start, Bound::Unbounded))
            .map(|(k, _)| k.clone());

        let keys: Vec<String> = iter.by_ref().take(max_keys).collect();
        let next_cursor = iter.next();
        Ok(ObjectPage { keys, next_cursor })
    }

    async fn put_object(&self, object: NewObject) -> Result<(), StoreError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::Put {
                key: object.key,
                message: "memory store: writes disabled".to_string(),
            });
        }
        self.objects.write().insert(
            object.key,
            StoredObject {
                body: object.body,
                content_type: object.content_type,
            },
        );
        Ok(())
    }

    fn default_public_base(&self) -> String {
        "memory://bucket".to_string()
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
