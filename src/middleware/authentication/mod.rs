//! Bearer-token authentication.
//!
//! A request carrying `Authorization: Bearer <token>` is resolved against the
//! identity provider at `auth_url`; the resulting user is stored in the
//! request extensions as `Arc<models::User>`. Requests without the header go
//! through anonymously and handlers decide whether that is acceptable.

mod getheader;
mod manager;
mod manager_middleware;
mod method;

pub use getheader::get_header;
pub use manager::*;
pub use manager_middleware::*;
pub use method::OAuthCache;
