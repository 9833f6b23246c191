use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::AppState;
use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RefreshResponse {
    /// 合并后的缓存条目数
    pub count: usize,
}

/// 重新列举对象存储并合并新键
#[utoipa::path(
    get,
    path = "/refresh",
    tag = "Feed",
    responses(
        (status = 200, description = "合并后的条目数", body = RefreshResponse),
        (status = 500, description = "refresh failed", body = String),
    ),
)]
pub async fn refresh_feed(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let count = state
        .cache
        .refresh()
        .await
        .map_err(|e| AppError::store("refresh", e))?;
    Ok(HttpResponse::Ok().json(RefreshResponse { count }))
}
