mod agent;
mod conversation;
mod organization;
mod user;

pub use agent::*;
pub use conversation::*;
pub use organization::*;
pub use user::*;
