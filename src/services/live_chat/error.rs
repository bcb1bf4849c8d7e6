use crate::connectors::ConnectorError;
use crate::db::StoreError;
use crate::helpers::JsonResponse;
use crate::hub::HubError;
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum LiveChatError {
    #[error("{0}")]
    NotFound(String),
    #[error("Authentication required")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("Conversation already accepted by another agent")]
    Conflict { accepted_by: String },
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Upstream(#[from] ConnectorError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LiveChatError {
    pub(crate) fn conversation_not_found() -> Self {
        Self::NotFound("Conversation not found".to_string())
    }
}

impl From<StoreError> for LiveChatError {
    fn from(err: StoreError) -> Self {
        tracing::error!("Conversation store failure: {:?}", err);
        Self::Internal(err.to_string())
    }
}

impl From<HubError> for LiveChatError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::NotFound(_) => Self::conversation_not_found(),
            HubError::Store(err) => err.into(),
        }
    }
}

impl ResponseError for LiveChatError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::InvalidState(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(err) => err.status_code(),
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            Self::Conflict { accepted_by } => JsonResponse::build()
                .set_msg(self.to_string())
                .set_item(json!({ "acceptedBy": accepted_by })),
            Self::Internal(_) => JsonResponse::build().set_msg("Internal error"),
            _ => JsonResponse::build().set_msg(self.to_string()),
        };
        HttpResponse::build(self.status_code()).json(body.into_response())
    }
}
