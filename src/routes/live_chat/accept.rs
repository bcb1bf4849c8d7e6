use crate::helpers::JsonResponse;
use crate::models;
use crate::routes::live_chat::require_user;
use crate::services::live_chat::LiveChatService;
use actix_web::{post, web, Responder, Result};
use std::sync::Arc;
use uuid::Uuid;

/// POST /api/live-chat/{id}/accept
/// 409 with `item.acceptedBy` when another agent was first.
#[tracing::instrument(name = "Accept live chat.", skip(service, user))]
#[post("/{id}/accept")]
pub async fn accept_handler(
    path: web::Path<(Uuid,)>,
    user: Option<web::ReqData<Arc<models::User>>>,
    service: web::Data<LiveChatService>,
) -> Result<impl Responder> {
    let user = require_user(user)?;
    let id = path.0;
    let view = service.accept(id, &user).await?;
    Ok(JsonResponse::build().set_id(id).set_item(view).ok("Live chat accepted"))
}
