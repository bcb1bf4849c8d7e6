use crate::hub::Hub;
use crate::services::live_chat::LiveChatError;
use actix_web::{get, http::header, web, HttpResponse};
use std::sync::Arc;
use uuid::Uuid;

/// GET /api/live-chat/{id}/stream
/// Server-sent events: a status snapshot, the recent messages, then every
/// change until the client disconnects.
#[tracing::instrument(name = "Stream live chat.", skip(hub))]
#[get("/{id}/stream")]
pub async fn stream_handler(
    path: web::Path<(Uuid,)>,
    hub: web::Data<Arc<Hub>>,
) -> Result<HttpResponse, LiveChatError> {
    let stream = hub.subscribe(path.0).await?;

    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(stream))
}
