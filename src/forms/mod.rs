pub mod live_chat;
pub mod user;

pub use live_chat::*;
pub use user::UserForm;
