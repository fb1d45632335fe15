pub mod admission;
pub mod ws_auth;

pub use admission::{admission, client_ip};
pub use ws_auth::{ws_auth, AuthenticatedIdentity};
