use crate::helpers::JsonResponse;
use crate::models;
use crate::routes::live_chat::require_user;
use crate::services::live_chat::LiveChatService;
use actix_web::{get, web, Responder, Result};
use std::sync::Arc;

/// GET /api/live-chat/queue
/// Conversations waiting for an agent in the caller's organizations.
#[tracing::instrument(name = "List live chat queue.", skip(service, user))]
#[get("/queue")]
pub async fn queue_handler(
    user: Option<web::ReqData<Arc<models::User>>>,
    service: web::Data<LiveChatService>,
) -> Result<impl Responder> {
    let user = require_user(user)?;
    let entries = service.queue(&user).await?;
    Ok(JsonResponse::build().set_list(entries).ok("OK"))
}
