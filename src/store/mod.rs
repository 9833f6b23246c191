/// 对象存储网关
/// Object store gateway
///
/// 列举桶内对象（支持 continuation token 分页）并上传新对象。
/// 业务层只依赖 [`ObjectStore`]，具体实现可以是 S3/R2，也可以是内存实现。
pub mod memory;
pub mod s3;

pub use memory::MemoryObjectStore;
pub use s3::{S3ObjectStore, S3Settings};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// 单次列举的最大对象数（S3 ListObjectsV2 的上限）
pub const MAX_LIST_KEYS: usize = 1000;

/// 对象存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("列举对象失败: {0}")]
    List(String),
    #[error("上传对象 '{key}' 失败: {message}")]
    Put { key: String, message: String },
    #[error("存储客户端初始化失败: {0}")]
    Init(String),
}

/// 一页列举结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    /// 本页对象键，按存储原生（字典序）顺序
    pub keys: Vec<String>,
    /// 还有更多结果时的续传标记
    pub next_cursor: Option<String>,
}

/// 待上传对象
#[derive(Debug, Clone)]
pub struct NewObject {
    pub key: String,
    pub body: Bytes,
    pub content_type: String,
}

/// 对象存储抽象
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// 从 `cursor` 开始列举最多 `max_keys` 个对象
    async fn list_page(
        &self,
        cursor: Option<&str>,
        max_keys: usize,
    ) -> Result<ObjectPage, StoreError>;

    /// 以公开可读的方式写入对象
    async fn put_object(&self, object: NewObject) -> Result<(), StoreError>;

    /// 未配置公开访问域名时使用的对象地址前缀
    fn default_public_base(&self) -> String;

    /// 后端名称，用于日志
    fn backend_name(&self) -> &'static str;
}

/// 连续翻页，直到列满 `cap` 个键或没有更多结果
///
/// 空键会被跳过；重复键由调用方处理。
pub async fn list_up_to(store: &dyn ObjectStore, cap: usize) -> Result<Vec<String>, StoreError> {
    let mut keys = Vec::new();
    let mut cursor: Option<String> = None;
    while keys.len() < cap {
        let want = (cap - keys.len()).min(MAX_LIST_KEYS);
        let page = store.list_page(cursor.as_deref(), want).await?;
        keys.extend(page.keys.into_iter().filter(|k| !k.is_empty()));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    keys.truncate(cap);
    Ok(keys)
}
