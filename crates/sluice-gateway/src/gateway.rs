//! Upgrade glue: turns an accepted duplex connection into a running session.

use futures_util::{Sink, Stream};
use sluice_core::SessionId;
use tokio::task::JoinHandle;

use crate::bridge::StreamBridge;
use crate::error::Result;
use crate::frame::WireFrame;
use crate::keepalive::Keepalive;
use crate::pump::{read_pump, write_pump, PumpExit};
use crate::registry::SessionRegistry;
use crate::session::{Session, SEND_QUEUE_CAPACITY};

/// Handles to the two pumps of an accepted session
#[derive(Debug)]
pub struct SessionTasks {
    pub id: SessionId,
    pub read: JoinHandle<PumpExit>,
    pub write: JoinHandle<PumpExit>,
}

#[derive(Debug, Clone)]
pub struct Gateway {
    registry: SessionRegistry,
    bridge: StreamBridge,
    keepalive: Keepalive,
    queue_capacity: usize,
}

impl Gateway {
    pub fn new(registry: SessionRegistry, bridge: StreamBridge) -> Self {
        Self {
            registry,
            bridge,
            keepalive: Keepalive::default(),
            queue_capacity: SEND_QUEUE_CAPACITY,
        }
    }

    pub fn with_keepalive(mut self, keepalive: Keepalive) -> Self {
        self.keepalive = keepalive;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn keepalive(&self) -> Keepalive {
        self.keepalive
    }

    /// Register a session for an authenticated connection and start its
    /// pumps. `identity` is whatever the upgrade authentication yielded.
    pub async fn accept<S, K, E>(&self, identity: Option<String>, inbound: S, outbound: K) -> Result<SessionTasks>
    where
        S: Stream<Item = std::result::Result<WireFrame, E>> + Unpin + Send + 'static,
        E: std::fmt::Display + Send + 'static,
        K: Sink<WireFrame> + Unpin + Send + 'static,
        K::Error: std::fmt::Display + Send,
    {
        let (session, rx) = Session::new(identity, self.queue_capacity);
        let id = session.id().clone();
        self.registry.register(session.clone()).await?;

        let read = tokio::spawn(read_pump(
            session.clone(),
            inbound,
            self.registry.clone(),
            self.bridge.clone(),
            self.keepalive,
        ));
        let write = tokio::spawn(write_pump(
            session,
            rx,
            outbound,
            self.registry.clone(),
            self.keepalive,
        ));

        Ok(SessionTasks { id, read, write })
    }
}
