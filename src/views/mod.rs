pub mod live_chat;
