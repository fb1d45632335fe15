//! Live session membership
//!
//! Membership changes go through a mailbox consumed by a single task, which
//! is also the only place a session is ever closed. Readers get snapshots
//! under a shared lock and never block that task for long.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use sluice_core::SessionId;
use sluice_observability::SessionMetrics;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{GatewayError, Result};
use crate::session::SessionHandle;

const MAILBOX_CAPACITY: usize = 1024;

enum RegistryCommand {
    Register {
        session: SessionHandle,
        reply: oneshot::Sender<bool>,
    },
    Unregister {
        id: SessionId,
        reply: oneshot::Sender<bool>,
    },
    Broadcast(Vec<u8>),
    Shutdown,
}

type Members = Arc<RwLock<HashMap<SessionId, SessionHandle>>>;

/// Cheap, cloneable handle to the registry task
#[derive(Clone)]
pub struct SessionRegistry {
    mailbox: mpsc::Sender<RegistryCommand>,
    members: Members,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .finish()
    }
}

impl SessionRegistry {
    /// Spawn the registry task on the current runtime
    pub fn spawn() -> (Self, JoinHandle<()>) {
        let (mailbox, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let members: Members = Arc::new(RwLock::new(HashMap::new()));
        let task = tokio::spawn(run(rx, Arc::clone(&members)));
        (Self { mailbox, members }, task)
    }

    pub async fn register(&self, session: SessionHandle) -> Result<()> {
        let id = session.id().clone();
        let (reply, rx) = oneshot::channel();
        self.mailbox
            .send(RegistryCommand::Register { session, reply })
            .await
            .map_err(|_| GatewayError::RegistryClosed)?;
        match rx.await {
            Ok(true) => Ok(()),
            Ok(false) => Err(GatewayError::DuplicateSession(id)),
            Err(_) => Err(GatewayError::RegistryClosed),
        }
    }

    /// Remove and close a session. Returns true if this call removed it;
    /// later calls for the same id are harmless no-ops.
    pub async fn unregister(&self, id: &SessionId) -> bool {
        let (reply, rx) = oneshot::channel();
        let command = RegistryCommand::Unregister {
            id: id.clone(),
            reply,
        };
        if self.mailbox.send(command).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Hand a payload to the registry for fan-out. Currently only logged.
    pub async fn broadcast(&self, payload: Vec<u8>) -> Result<()> {
        self.mailbox
            .send(RegistryCommand::Broadcast(payload))
            .await
            .map_err(|_| GatewayError::RegistryClosed)
    }

    /// Close every session and stop accepting commands
    pub async fn shutdown(&self) {
        let _ = self.mailbox.send(RegistryCommand::Shutdown).await;
    }

    /// Ids of the live sessions at this instant
    pub fn snapshot(&self) -> Vec<SessionId> {
        self.members.read().keys().cloned().collect()
    }

    pub fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.members.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn run(mut rx: mpsc::Receiver<RegistryCommand>, members: Members) {
    while let Some(command) = rx.recv().await {
        match command {
            RegistryCommand::Register { session, reply } => {
                let id = session.id().clone();
                let inserted = {
                    let mut members = members.write();
                    if members.contains_key(&id) {
                        false
                    } else {
                        members.insert(id.clone(), session);
                        SessionMetrics::set_active(members.len());
                        true
                    }
                };
                if inserted {
                    SessionMetrics::record_opened();
                    tracing::info!(session_id = %id, "session registered");
                } else {
                    tracing::warn!(session_id = %id, "session registered twice, ignoring");
                }
                let _ = reply.send(inserted);
            }
            RegistryCommand::Unregister { id, reply } => {
                let removed = {
                    let mut members = members.write();
                    let removed = members.remove(&id);
                    SessionMetrics::set_active(members.len());
                    removed
                };
                let closed = match removed {
                    Some(session) => {
                        session.close();
                        SessionMetrics::record_closed();
                        tracing::info!(session_id = %id, "session unregistered");
                        true
                    }
                    None => false,
                };
                let _ = reply.send(closed);
            }
            RegistryCommand::Broadcast(payload) => {
                tracing::debug!(bytes = payload.len(), "broadcast requested, no fan-out configured");
            }
            RegistryCommand::Shutdown => break,
        }
    }

    rx.close();
    let drained: Vec<_> = {
        let mut members = members.write();
        SessionMetrics::set_active(0);
        members.drain().collect()
    };
    for (id, session) in drained {
        session.close();
        SessionMetrics::record_closed();
        tracing::info!(session_id = %id, "session closed on shutdown");
    }
    tracing::info!("session registry stopped");
}
