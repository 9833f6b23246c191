use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::comm::config::ConfigError;
use crate::store::StoreError;
use crate::vote::VoteError;

/// 统一的应用错误类型
#[derive(Error, Debug)]
pub enum AppError {
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    #[error("验证错误: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{0}")]
    BadRequest(String),

    #[error("上传内容超过 {limit} 字节")]
    PayloadTooLarge { limit: usize },

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("对象存储错误 ({operation}): {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("投票存储错误 ({operation}): {source}")]
    Vote {
        operation: &'static str,
        #[source]
        source: VoteError,
    },

    #[error("内部错误: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// 创建验证错误
    pub fn validation<T: Into<String>, U: Into<String>>(field: T, message: U) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// 创建请求参数错误
    pub fn bad_request<T: Into<String>>(message: T) -> Self {
        Self::BadRequest(message.into())
    }

    /// 对象存储调用失败
    pub fn store(operation: &'static str, source: StoreError) -> Self {
        Self::Store { operation, source }
    }

    /// 投票存储调用失败
    pub fn vote(operation: &'static str, source: VoteError) -> Self {
        Self::Vote { operation, source }
    }

    /// 返回给调用方的消息；上游错误只给出笼统描述，细节写日志
    pub fn public_message(&self) -> String {
        match self {
            AppError::Config(_) => "configuration error".to_string(),
            AppError::Validation { field, message } => format!("{}: {}", field, message),
            AppError::BadRequest(message) => message.clone(),
            AppError::PayloadTooLarge { .. } => "image too large".to_string(),
            AppError::MethodNotAllowed => "method not allowed".to_string(),
            AppError::Store { operation, .. } | AppError::Vote { operation, .. } => {
                format!("{} failed", operation)
            }
            AppError::Internal(_) => "internal error".to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Vote { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // 记录错误日志
        match self {
            AppError::Store { .. }
            | AppError::Vote { .. }
            | AppError::Internal(_)
            | AppError::Config(_) => {
                tracing::error!("{}", self);
            }
            _ => {
                tracing::info!("Client error: {}", self);
            }
        }

        HttpResponse::build(self.status_code())
            .insert_header(ContentType::plaintext())
            .body(self.public_message())
    }
}

/// 应用结果类型
pub type AppResult<T> = Result<T, AppError>;
