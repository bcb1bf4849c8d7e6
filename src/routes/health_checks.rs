use crate::helpers::JsonResponse;
use crate::hub::Hub;
use crate::views::live_chat::HubStats;
use actix_web::{get, web, Responder};
use std::sync::Arc;

#[get("")]
pub async fn health_check(hub: web::Data<Arc<Hub>>) -> impl Responder {
    let stats = HubStats {
        connections: hub.connection_count(),
        conversations: hub.conversation_count(),
    };
    JsonResponse::build().set_item(stats).ok("OK")
}
