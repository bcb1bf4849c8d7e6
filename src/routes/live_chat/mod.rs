mod accept;
mod agent;
mod end;
mod handoff;
mod message;
mod poll;
mod queue;
mod stream;

pub use accept::*;
pub use agent::*;
pub use end::*;
pub use handoff::*;
pub use message::*;
pub use poll::*;
pub use queue::*;
pub use stream::*;

use crate::models;
use crate::services::live_chat::LiveChatError;
use actix_web::web;
use std::sync::Arc;

/// The authenticated caller, or Unauthorized for anonymous requests.
pub(crate) fn require_user(
    user: Option<web::ReqData<Arc<models::User>>>,
) -> Result<Arc<models::User>, LiveChatError> {
    user.map(web::ReqData::into_inner)
        .ok_or(LiveChatError::Unauthorized)
}
