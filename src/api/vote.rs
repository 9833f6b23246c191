use std::sync::Arc;

use actix_web::{web, HttpResponse};
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use super::AppState;
use crate::error::{AppError, AppResult};
use crate::vote::{Consensus, VoteStore};

/// 投票请求体
#[derive(Debug, Deserialize, ToSchema)]
pub struct VoteRequest {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub namu_is_tuxedo: bool,
}

/// 投票成功的响应
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VoteAck {
    pub ok: String,
}

fn vote_store(state: &AppState) -> AppResult<&Arc<dyn VoteStore>> {
    state
        .votes
        .as_ref()
        .ok_or_else(|| AppError::Internal(anyhow!("投票存储未配置")))
}

/// 记录一次投票
#[utoipa::path(
    post,
    path = "/vote",
    tag = "Vote",
    request_body = VoteRequest,
    responses(
        (status = 200, description = "已记录", body = VoteAck),
        (status = 400, description = "invalid JSON / key required", body = String),
        (status = 500, description = "vote failed", body = String),
    ),
)]
pub async fn cast_vote(state: web::Data<AppState>, body: web::Bytes) -> AppResult<HttpResponse> {
    let votes = vote_store(&state)?;

    let request: VoteRequest =
        serde_json::from_slice(&body).map_err(|_| AppError::bad_request("invalid JSON"))?;
    if request.key.is_empty() {
        return Err(AppError::bad_request("key required"));
    }

    votes
        .cast(&request.key, request.namu_is_tuxedo)
        .await
        .map_err(|e| AppError::vote("vote", e))?;
    info!(key = %request.key, namu_is_tuxedo = request.namu_is_tuxedo, "收到投票");

    Ok(HttpResponse::Ok().json(VoteAck {
        ok: "voted".to_string(),
    }))
}

/// 投票汇总
#[utoipa::path(
    get,
    path = "/consensus",
    tag = "Vote",
    responses(
        (status = 200, description = "按布尔值统计的客户端数量", body = Consensus),
        (status = 500, description = "consensus failed", body = String),
    ),
)]
pub async fn consensus(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let tally = vote_store(&state)?
        .tally()
        .await
        .map_err(|e| AppError::vote("consensus", e))?;
    Ok(HttpResponse::Ok().json(tally))
}
