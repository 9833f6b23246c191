use actix_web::HttpResponse;
use utoipa::OpenApi;

/// OpenAPI 文档聚合
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::feed::get_feed,
        crate::api::upload::upload_image,
        crate::api::refresh::refresh_feed,
        crate::api::vote::cast_vote,
        crate::api::vote::consensus,
    ),
    components(
        schemas(
            crate::feed::FeedPage,
            crate::feed::DeliveryStrategy,
            crate::api::upload::UploadResponse,
            crate::api::upload::UploadForm,
            crate::api::refresh::RefreshResponse,
            crate::api::vote::VoteRequest,
            crate::api::vote::VoteAck,
            crate::vote::Consensus,
        )
    ),
    tags(
        (name = "Feed", description = "图片 feed 下发与缓存刷新"),
        (name = "Upload", description = "图片上传"),
        (name = "Vote", description = "投票与汇总（需配置数据库）")
    )
)]
pub struct ApiDoc;

/// 返回 OpenAPI JSON 文档
pub async fn openapi_json() -> HttpResponse {
    HttpResponse::Ok().json(ApiDoc::openapi())
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::configure_routes;
    use crate::api::testing::state_with;
    use crate::feed::DeliveryStrategy;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_openapi_route() {
        let (state, _) = state_with(&[], DeliveryStrategy::PerClient).await;
        let app = test::init_service(
            App::new()
                .app_data(state)
                .configure(|cfg| configure_routes(cfg, false)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api-doc/openapi.json").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert!(body["paths"]["/feed"]["get"].is_object());
    }
}
