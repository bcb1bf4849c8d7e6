use crate::helpers::JsonResponse;
use crate::models;
use crate::routes::live_chat::require_user;
use crate::services::live_chat::LiveChatService;
use actix_web::{post, web, Responder, Result};
use std::sync::Arc;
use uuid::Uuid;

/// POST /api/live-chat/{id}/end
#[tracing::instrument(name = "End live chat.", skip(service, user))]
#[post("/{id}/end")]
pub async fn end_handler(
    path: web::Path<(Uuid,)>,
    user: Option<web::ReqData<Arc<models::User>>>,
    service: web::Data<LiveChatService>,
) -> Result<impl Responder> {
    let user = require_user(user)?;
    let id = path.0;
    let view = service.end(id, &user).await?;
    Ok(JsonResponse::build().set_id(id).set_item(view).ok("Live chat ended"))
}
