use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;

/// Errors that can occur during external service communication
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    HttpError(String),
    /// Service unreachable or timeout
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Invalid response format from external service
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// Not found (404)
    #[error("Not found: {0}")]
    NotFound(String),
    /// Internal error in connector
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for ConnectorError {
    fn error_response(&self) -> HttpResponse {
        let message = match self {
            Self::HttpError(_) => "External service error",
            Self::ServiceUnavailable(_) => "Service unavailable",
            Self::InvalidResponse(_) => "Invalid external service response",
            Self::NotFound(_) => "Resource not found",
            Self::Internal(_) => "Internal error",
        };

        HttpResponse::build(self.status_code()).json(json!({
            "message": message,
            "details": self.to_string(),
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::HttpError(_) => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for ConnectorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::ServiceUnavailable(format!("Request timeout: {}", err))
        } else if err.is_connect() {
            Self::ServiceUnavailable(format!("Connection failed: {}", err))
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::HttpError(err.to_string())
        }
    }
}
