use crate::forms;
use crate::helpers::JsonResponse;
use crate::models;
use crate::routes::live_chat::require_user;
use crate::services::live_chat::LiveChatService;
use actix_web::{get, put, web, Responder, Result};
use std::sync::Arc;

/// GET /api/live-chat/active
#[tracing::instrument(name = "List active live chats.", skip(service, user))]
#[get("/active")]
pub async fn active_handler(
    user: Option<web::ReqData<Arc<models::User>>>,
    service: web::Data<LiveChatService>,
) -> Result<impl Responder> {
    let user = require_user(user)?;
    let chats = service.active_chats(&user).await?;
    Ok(JsonResponse::build().set_list(chats).ok("OK"))
}

/// PUT /api/live-chat/availability
#[tracing::instrument(name = "Set agent availability.", skip(service, user))]
#[put("/availability")]
pub async fn availability_handler(
    user: Option<web::ReqData<Arc<models::User>>>,
    form: web::Json<forms::AvailabilityForm>,
    service: web::Data<LiveChatService>,
) -> Result<impl Responder> {
    let user = require_user(user)?;
    let availability = service.set_availability(&user, form.is_available).await?;
    Ok(JsonResponse::build().set_item(availability).ok("OK"))
}
