//! ClubSite Error Types
//!
//! 애플리케이션 전역 에러 타입 정의

use serde::Serialize;
use thiserror::Error;

/// ClubSite 애플리케이션 에러
#[derive(Error, Debug)]
pub enum CseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Subscription error: {0}")]
    Subscription(String),
}

impl CseError {
    /// 재시도 대상 에러인지 여부
    ///
    /// Config/Validation은 입력이 바뀌지 않는 한 결과가 같으므로 제외합니다.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CseError::Http(_) | CseError::Backend { .. } | CseError::Io(_)
        )
    }
}

/// 명령 응답용 직렬화 가능한 에러
#[derive(Debug, Clone, Serialize)]
pub struct CommandError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl CommandError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        CommandError {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }
}

impl From<CseError> for CommandError {
    fn from(error: CseError) -> Self {
        let code = match &error {
            CseError::Config(_) => "CONFIG_ERROR",
            CseError::Http(_) => "HTTP_ERROR",
            CseError::Backend { .. } => "BACKEND_ERROR",
            CseError::Io(_) => "IO_ERROR",
            CseError::Serialization(_) => "SERIALIZATION_ERROR",
            CseError::Validation(_) => "VALIDATION_ERROR",
            CseError::Subscription(_) => "SUBSCRIBE_ERROR",
        };

        CommandError {
            code: code.to_string(),
            message: error.to_string(),
            details: None,
        }
    }
}

/// 명령 결과 타입
pub type CommandResult<T> = Result<T, CommandError>;
