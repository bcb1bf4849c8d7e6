use crate::forms;
use crate::helpers::JsonResponse;
use crate::services::live_chat::LiveChatService;
use actix_web::{post, web, Responder, Result};
use serde_valid::Validate;
use uuid::Uuid;

/// POST /api/live-chat/{id}/request
/// Escalates an AI conversation to the agent queue. The body is optional.
#[tracing::instrument(name = "Request live chat handoff.", skip(service))]
#[post("/{id}/request")]
pub async fn request_handler(
    path: web::Path<(Uuid,)>,
    form: Option<web::Json<forms::HandoffForm>>,
    service: web::Data<LiveChatService>,
) -> Result<impl Responder> {
    let form = form.map(web::Json::into_inner).unwrap_or_default();
    if let Err(errors) = form.validate() {
        return Err(JsonResponse::<()>::build().form_error(errors.to_string()));
    }

    let id = path.0;
    let view = service.request_handoff(id, form.reason).await?;
    Ok(JsonResponse::build().set_id(id).set_item(view).ok("Agent requested"))
}
