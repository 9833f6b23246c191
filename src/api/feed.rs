use actix_web::{web, HttpResponse};
use serde::Deserialize;
use utoipa::IntoParams;

use super::AppState;
use crate::error::AppResult;
use crate::feed::{FeedPage, FeedQuery};

/// `/feed` 查询参数
///
/// `limit` 按字符串接收，无法解析时使用默认值而不是返回 400。
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FeedParams {
    /// 返回数量；非正数或无法解析时使用默认值
    pub limit: Option<String>,
    /// 客户端标识（per-client 策略必填）
    pub key: Option<String>,
    /// 上一页返回的 nextCursor（paginated 策略）
    pub cursor: Option<String>,
}

impl From<FeedParams> for FeedQuery {
    fn from(params: FeedParams) -> Self {
        FeedQuery {
            limit: FeedQuery::parse_limit(params.limit.as_deref()),
            key: params.key.filter(|k| !k.is_empty()),
            cursor: params.cursor.filter(|c| !c.is_empty()),
        }
    }
}

/// 获取一批图片 URL
#[utoipa::path(
    get,
    path = "/feed",
    tag = "Feed",
    params(FeedParams),
    responses(
        (status = 200, description = "本次下发的 URL", body = FeedPage),
        (status = 400, description = "key required", body = String),
        (status = 500, description = "feed failed", body = String),
    ),
)]
pub async fn get_feed(
    state: web::Data<AppState>,
    params: web::Query<FeedParams>,
) -> AppResult<HttpResponse> {
    let query = FeedQuery::from(params.into_inner());
    let page = state.feed.deliver(&query).await?;
    Ok(HttpResponse::Ok().json(page))
}
