//! Sluice Gateway
//!
//! Long-lived duplex sessions: registration, the read and write pumps that
//! keep a connection alive, and the bridge that relays backend fragment
//! streams back to the session that asked for them.

pub mod bridge;
pub mod error;
pub mod frame;
pub mod gateway;
pub mod keepalive;
pub mod pump;
pub mod registry;
pub mod session;

pub use bridge::{RelayOutcome, StreamBridge};
pub use error::{GatewayError, SessionError};
pub use frame::WireFrame;
pub use gateway::{Gateway, SessionTasks};
pub use keepalive::Keepalive;
pub use pump::PumpExit;
pub use registry::SessionRegistry;
pub use session::{Session, SessionHandle, SEND_QUEUE_CAPACITY};
