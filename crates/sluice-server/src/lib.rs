//! Sluice Server - HTTP surface of the gateway
//!
//! Wires configuration, admission control, identity checks and the session
//! gateway into one axum application.

pub mod error;
pub mod handlers;
pub mod identity;
pub mod middleware;
pub mod reload;
pub mod server;
pub mod state;

pub use error::{ApiError, ServerError};
pub use identity::{
    Credentials, HttpIdentityClient, IdentityError, IdentityService, LoginGrant, Registration,
    TokenClaims,
};
pub use reload::{reload_logging, Overrides};
pub use server::{create_router, serve, shutdown_signal};
pub use state::AppState;
