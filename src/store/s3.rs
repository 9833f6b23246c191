use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use super::{NewObject, ObjectPage, ObjectStore, StoreError, MAX_LIST_KEYS};

/// S3 / R2 连接参数
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub account_id: String,
    pub access_key_id: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
    /// 自定义端点；为空时使用 R2 账户端点
    pub endpoint: Option<String>,
}

impl S3Settings {
    /// 实际使用的端点地址
    pub fn endpoint_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}.r2.cloudflarestorage.com", self.account_id),
        }
    }
}

/// 基于 aws-sdk-s3 的对象存储
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    endpoint: String,
}

impl S3ObjectStore {
    /// 使用静态凭证构建客户端
    pub async fn connect(settings: &S3Settings) -> Result<Self, StoreError> {
        if settings.bucket.is_empty() {
            return Err(StoreError::Init("bucket 不能为空".to_string()));
        }

        let endpoint = settings.endpoint_url();
        let credentials = Credentials::new(
            settings.access_key_id.clone(),
            settings.secret_key.clone(),
            None,
            None,
            "photo-feed-static",
        );

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(endpoint.clone())
            .load()
            .await;

        info!(bucket = %settings.bucket, endpoint = %endpoint, "S3 客户端已创建");

        Ok(Self {
            client: Client::new(&sdk_config),
            bucket: settings.bucket.clone(),
            endpoint,
        })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list_page(
        &self,
        cursor: Option<&str>,
        max_keys: usize,
    ) -> Result<ObjectPage, StoreError> {
        let max_keys = max_keys.clamp(1, MAX_LIST_KEYS) as i32;
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .max_keys(max_keys)
            .set_continuation_token(cursor.map(str::to_string))
            .send()
            .await
            .map_err(|e| StoreError::List(DisplayErrorContext(&e).to_string()))?;

        let keys: Vec<String> = output
            .contents()
            .iter()
            .filter_map(|obj| obj.key())
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .collect();

        let next_cursor = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        debug!(count = keys.len(), more = next_cursor.is_some(), "列举对象");
        Ok(ObjectPage { keys, next_cursor })
    }

    async fn put_object(&self, object: NewObject) -> Result<(), StoreError> {
        let NewObject {
            key,
            body,
            content_type,
        } = object;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| StoreError::Put {
                key: key.clone(),
                message: DisplayErrorContext(&e).to_string(),
            })?;
        Ok(())
    }

    fn default_public_base(&self) -> String {
        format!("{}/{}", self.endpoint, self.bucket)
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}
