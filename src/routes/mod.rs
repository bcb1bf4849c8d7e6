pub mod health_checks;
pub(crate) mod live_chat;

pub use health_checks::*;
