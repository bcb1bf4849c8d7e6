use crate::forms;
use crate::helpers::JsonResponse;
use crate::services::live_chat::LiveChatService;
use actix_web::{get, web, Responder, Result};
use uuid::Uuid;

/// GET /api/live-chat/{id}/poll?lastMessageId={message id}
#[tracing::instrument(name = "Poll live chat.", skip(service))]
#[get("/{id}/poll")]
pub async fn poll_handler(
    path: web::Path<(Uuid,)>,
    query: web::Query<forms::PollQuery>,
    service: web::Data<LiveChatService>,
) -> Result<impl Responder> {
    let id = path.0;
    let result = service
        .poll(id, query.last_message_id.as_deref())
        .await?;
    Ok(JsonResponse::build().set_id(id).set_item(result).ok("OK"))
}
