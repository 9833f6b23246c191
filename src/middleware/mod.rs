/// HTTP 中间件
pub mod cors;

pub use cors::{CorsConfig, CorsMiddleware};
