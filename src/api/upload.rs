use actix_multipart::{Field, Multipart, MultipartError};
use actix_web::{web, HttpResponse};
use bytes::BytesMut;
use chrono::{DateTime, Local};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use super::AppState;
use crate::error::{AppError, AppResult};
use crate::store::NewObject;

const IMAGE_FIELD: &str = "image";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const DEFAULT_EXTENSION: &str = ".jpg";

/// 上传成功的响应
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub key: String,
}

/// multipart 表单（仅用于文档）
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    pub image: Vec<u8>,
}

struct ImagePart {
    filename: Option<String>,
    content_type: Option<String>,
    body: BytesMut,
}

fn invalid_image_field() -> AppError {
    AppError::bad_request("missing or invalid form field 'image'")
}

fn multipart_error(e: MultipartError) -> AppError {
    warn!("multipart 解析失败: {}", e);
    invalid_image_field()
}

/// 由上传文件名生成对象键
///
/// 取最后一个路径段，`[A-Za-z0-9._-]` 以外的连续字符替换为一个 `-`；
/// 结果为空、`.` 或 `..` 时改用 `YYYY-MM-DD-HHMMSS<ext>`。
pub fn derive_object_key(filename: &str, now: DateTime<Local>) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();

    let mut key = String::with_capacity(base.len());
    let mut in_run = false;
    for c in base.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            key.push(c);
            in_run = false;
        } else if !in_run {
            key.push('-');
            in_run = true;
        }
    }

    if !key.is_empty() && key != "." && key != ".." {
        return key;
    }

    format!("{}{}", now.format("%Y-%m-%d-%H%M%S"), extension_of(base))
}

/// 小写扩展名（含点），没有时返回 `.jpg`
fn extension_of(base: &str) -> String {
    match base.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            format!(".{}", ext.to_ascii_lowercase())
        }
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

async fn read_field(field: &mut Field, limit: usize) -> AppResult<BytesMut> {
    let mut body = BytesMut::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(multipart_error)?;
        if body.len() + chunk.len() > limit {
            return Err(AppError::PayloadTooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// 找到第一个 `image` 字段并读出内容，其他字段丢弃
async fn read_image(payload: &mut Multipart, limit: usize) -> AppResult<ImagePart> {
    while let Some(item) = payload.next().await {
        let mut field = item.map_err(multipart_error)?;

        if field.name() != Some(IMAGE_FIELD) {
            while let Some(chunk) = field.next().await {
                chunk.map_err(multipart_error)?;
            }
            continue;
        }

        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);
        let content_type = field.content_type().map(|mime| mime.to_string());
        let body = read_field(&mut field, limit).await?;

        return Ok(ImagePart {
            filename,
            content_type,
            body,
        });
    }

    Err(invalid_image_field())
}

/// 上传一张图片
#[utoipa::path(
    post,
    path = "/upload",
    tag = "Upload",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "上传成功", body = UploadResponse),
        (status = 400, description = "missing or invalid form field 'image'", body = String),
        (status = 413, description = "image too large", body = String),
        (status = 500, description = "upload failed", body = String),
    ),
)]
pub async fn upload_image(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> AppResult<HttpResponse> {
    let image = read_image(&mut payload, state.max_upload_bytes).await?;

    let filename = image.filename.unwrap_or_default();
    let key = derive_object_key(&filename, Local::now());
    let content_type = image
        .content_type
        .filter(|ct| !ct.is_empty())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

    info!(filename = %filename, key = %key, size = image.body.len(), "收到新文件");

    state
        .store
        .put_object(NewObject {
            key: key.clone(),
            body: image.body.freeze(),
            content_type,
        })
        .await
        .map_err(|e| AppError::store("upload", e))?;

    if state.record_uploads {
        state.cache.record(&key, state.cache.public_url(&key));
    }
    info!(key = %key, backend = state.store.backend_name(), "上传成功");

    Ok(HttpResponse::Ok().json(UploadResponse { key }))
}
