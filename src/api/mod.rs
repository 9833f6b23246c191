/// HTTP 接口层
/// HTTP surface
pub mod feed;
pub mod openapi;
pub mod refresh;
pub mod upload;
pub mod vote;

use std::sync::Arc;

use actix_web::{web, HttpResponse};

use crate::error::{AppError, AppResult};
use crate::feed::{FeedCache, FeedService};
use crate::store::ObjectStore;
use crate::vote::VoteStore;

/// 所有处理函数共享的应用状态，通过 `web::Data` 注入
#[derive(Clone)]
pub struct AppState {
    pub feed: Arc<FeedService>,
    pub cache: Arc<FeedCache>,
    pub store: Arc<dyn ObjectStore>,
    /// 未配置数据库时为 None，投票接口不挂载
    pub votes: Option<Arc<dyn VoteStore>>,
    pub record_uploads: bool,
    pub max_upload_bytes: usize,
}

async fn method_not_allowed() -> AppResult<HttpResponse> {
    Err(AppError::MethodNotAllowed)
}

/// 注册所有路由；已知路径上的其他方法返回 405
pub fn configure_routes(cfg: &mut web::ServiceConfig, voting_enabled: bool) {
    cfg.service(
        web::resource("/feed")
            .route(web::get().to(feed::get_feed))
            .default_service(web::to(method_not_allowed)),
    )
    .service(
        web::resource("/upload")
            .route(web::post().to(upload::upload_image))
            .default_service(web::to(method_not_allowed)),
    )
    .service(
        web::resource("/refresh")
            .route(web::get().to(refresh::refresh_feed))
            .default_service(web::to(method_not_allowed)),
    )
    .service(
        web::resource("/api-doc/openapi.json")
            .route(web::get().to(openapi::openapi_json))
            .default_service(web::to(method_not_allowed)),
    );

    if voting_enabled {
        cfg.service(
            web::resource("/vote")
                .route(web::post().to(vote::cast_vote))
                .default_service(web::to(method_not_allowed)),
        )
        .service(
            web::resource("/consensus")
                .route(web::get().to(vote::consensus))
                .default_service(web::to(method_not_allowed)),
        );
    }
}
