use crate::forms;
use crate::helpers::JsonResponse;
use crate::models;
use crate::routes::live_chat::require_user;
use crate::services::live_chat::LiveChatService;
use actix_web::{post, web, Responder, Result};
use serde_valid::Validate;
use std::sync::Arc;
use uuid::Uuid;

/// POST /api/live-chat/{id}/messages
/// Reply from the agent who accepted the chat.
#[tracing::instrument(name = "Send agent message.", skip(service, user, form))]
#[post("/{id}/messages")]
pub async fn agent_message_handler(
    path: web::Path<(Uuid,)>,
    user: Option<web::ReqData<Arc<models::User>>>,
    form: web::Json<forms::MessageForm>,
    service: web::Data<LiveChatService>,
) -> Result<impl Responder> {
    let user = require_user(user)?;
    if let Err(errors) = form.validate() {
        return Err(JsonResponse::<()>::build().form_error(errors.to_string()));
    }

    let id = path.0;
    let message = service.send_message(id, &user, &form.content).await?;
    Ok(JsonResponse::build().set_id(id).set_item(message).ok("Message sent"))
}

/// POST /api/live-chat/{id}/user-message
/// Message from the widget visitor; no authentication.
#[tracing::instrument(name = "Send user message.", skip(service, form))]
#[post("/{id}/user-message")]
pub async fn user_message_handler(
    path: web::Path<(Uuid,)>,
    form: web::Json<forms::MessageForm>,
    service: web::Data<LiveChatService>,
) -> Result<impl Responder> {
    if let Err(errors) = form.validate() {
        return Err(JsonResponse::<()>::build().form_error(errors.to_string()));
    }

    let id = path.0;
    let message = service.user_message(id, &form.content).await?;
    Ok(JsonResponse::build().set_id(id).set_item(message).ok("Message sent"))
}
