use actix_web::error::InternalError;
use actix_web::http::StatusCode;
use actix_web::{web, Error, HttpResponse};
use serde::Serialize;

/// Envelope shared by every JSON endpoint: `{message, id?, item?, list?}`.
#[derive(Serialize)]
pub(crate) struct JsonResponse<T> {
    pub(crate) message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) item: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) list: Option<Vec<T>>,
}

pub(crate) struct JsonResponseBuilder<T>
where
    T: Serialize,
{
    message: String,
    id: Option<String>,
    item: Option<T>,
    list: Option<Vec<T>>,
}

impl<T> JsonResponse<T>
where
    T: Serialize,
{
    pub(crate) fn build() -> JsonResponseBuilder<T> {
        JsonResponseBuilder {
            message: String::new(),
            id: None,
            item: None,
            list: None,
        }
    }
}

impl<T> JsonResponseBuilder<T>
where
    T: Serialize,
{
    pub(crate) fn set_msg<S: Into<String>>(mut self, msg: S) -> Self {
        self.message = msg.into();
        self
    }

    pub(crate) fn set_id<I: ToString>(mut self, id: I) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub(crate) fn set_item(mut self, item: T) -> Self {
        self.item = Some(item);
        self
    }

    pub(crate) fn set_list(mut self, list: Vec<T>) -> Self {
        self.list = Some(list);
        self
    }

    pub(crate) fn into_response(self) -> JsonResponse<T> {
        JsonResponse {
            message: self.message,
            id: self.id,
            item: self.item,
            list: self.list,
        }
    }

    pub(crate) fn ok<S: Into<String>>(self, msg: S) -> web::Json<JsonResponse<T>> {
        web::Json(self.set_msg(msg).into_response())
    }

    /// Builds an actix error whose body is this envelope.
    pub(crate) fn error<S: Into<String>>(self, status: StatusCode, msg: S) -> Error {
        let msg = msg.into();
        let response = HttpResponse::build(status).json(self.set_msg(msg.clone()).into_response());
        InternalError::from_response(msg, response).into()
    }

    pub(crate) fn form_error<S: Into<String>>(self, msg: S) -> Error {
        self.error(StatusCode::BAD_REQUEST, msg)
    }

    pub(crate) fn unauthorized<S: Into<String>>(self, msg: S) -> Error {
        self.error(StatusCode::UNAUTHORIZED, msg)
    }
}
