use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::{
        header::{self, HeaderValue},
        Method,
    },
    Error, HttpResponse,
};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use tracing::{debug, warn};

const ALLOW_METHODS: &str = "GET, POST, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type";

/// CORS 配置
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// `Access-Control-Allow-Origin` 的值
    pub allowed_origin: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origin: "*".to_string(),
        }
    }
}

/// CORS 中间件
///
/// 给所有响应加上 CORS 头；`OPTIONS` 预检直接返回 204，不进入路由。
pub struct CorsMiddleware {
    origin: HeaderValue,
}

impl CorsMiddleware {
    pub fn new(config: CorsConfig) -> Self {
        let origin = HeaderValue::from_str(&config.allowed_origin).unwrap_or_else(|_| {
            warn!("CORS 来源 '{}' 不是合法的头部值，改用 *", config.allowed_origin);
            HeaderValue::from_static("*")
        });
        Self { origin }
    }

    /// 添加 CORS 头
    fn add_cors_headers(headers: &mut header::HeaderMap, origin: &HeaderValue) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        );
    }
}

impl<S, B> Transform<S, ServiceRequest> for CorsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = CorsMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(CorsMiddlewareService {
            service: Rc::new(service),
            origin: self.origin.clone(),
        }))
    }
}

pub struct CorsMiddlewareService<S> {
    service: Rc<S>,
    origin: HeaderValue,
}

impl<S, B> Service<ServiceRequest> for CorsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let origin = self.origin.clone();

        Box::pin(async move {
            // 预检请求
            if req.method() == Method::OPTIONS {
                debug!("CORS 预检: {}", req.path());
                let mut response = req.into_response(HttpResponse::NoContent().finish());
                CorsMiddleware::add_cors_headers(response.headers_mut(), &origin);
                return Ok(response.map_into_right_body());
            }

            let mut response = service.call(req).await?;
            CorsMiddleware::add_cors_headers(response.headers_mut(), &origin);
            Ok(response.map_into_left_body())
        })
    }
}


#[cfg(test)]
mod origin_tests {
    use super::*;

    #[test]
    fn test_invalid_origin_falls_back_to_wildcard() {
        let middleware = CorsMiddleware::new(CorsConfig {
            allowed_origin: "bad\norigin".to_string(),
        });
        assert_eq!(middleware.origin, "*");
    }
}
