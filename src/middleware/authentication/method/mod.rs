mod f_oauth;

pub use f_oauth::{try_oauth, OAuthCache};
