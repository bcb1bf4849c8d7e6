pub mod live_chat;

pub use live_chat::{LiveChatError, LiveChatService};
