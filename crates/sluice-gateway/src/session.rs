//! One duplex connection
//!
//! Everything a session sends goes through [`Session::send`], which blocks
//! while the outbound queue is full and refuses once the session is closed.
//! Only the registry closes a session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sluice_core::{Envelope, SessionId};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::error::SessionError;

/// Outbound queue capacity per session
pub const SEND_QUEUE_CAPACITY: usize = 256;

pub type SessionHandle = Arc<Session>;

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    identity: Option<String>,
    outbound: mpsc::Sender<Vec<u8>>,
    teardown: CancellationToken,
    closed: AtomicBool,
}

impl Session {
    /// Create a session and the receiving end of its outbound queue, which
    /// belongs to the write pump.
    pub fn new(identity: Option<String>, capacity: usize) -> (SessionHandle, mpsc::Receiver<Vec<u8>>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let session = Arc::new(Self {
            id: SessionId::new(),
            identity: identity.filter(|id| !id.is_empty()),
            outbound,
            teardown: CancellationToken::new(),
            closed: AtomicBool::new(false),
        });
        (session, rx)
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Authenticated caller, if any
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.teardown.is_cancelled()
    }

    /// Resolves once the session has been torn down
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.teardown.cancelled()
    }

    /// A cancellation scope that ends no later than this session
    pub fn child_scope(&self) -> CancellationToken {
        self.teardown.child_token()
    }

    /// Encode and enqueue one envelope, waiting for room if the queue is full
    pub async fn send(&self, envelope: &Envelope) -> Result<(), SessionError> {
        let bytes = envelope.encode()?;
        self.send_bytes(bytes).await
    }

    pub async fn send_error(&self, code: u16, message: impl Into<String>) -> Result<(), SessionError> {
        self.send(&Envelope::error(code, message)).await
    }

    pub async fn send_bytes(&self, bytes: Vec<u8>) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        tokio::select! {
            biased;
            _ = self.teardown.cancelled() => Err(SessionError::Closed),
            sent = self.outbound.send(bytes) => sent.map_err(|_| SessionError::Closed),
        }
    }

    /// Tear the session down. Returns true only for the call that actually
    /// closed it.
    pub(crate) fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.teardown.cancel();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn send_enqueues_encoded_envelope() {
        let (session, mut rx) = Session::new(Some("u1".into()), 4);
        session.send(&Envelope::pong()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), br#"{"type":"pong"}"#.to_vec());
        assert_eq!(session.identity(), Some("u1"));
    }

    #[tokio::test]
    async fn close_happens_once_and_rejects_later_sends() {
        let (session, _rx) = Session::new(None, 4);
        let scope = session.child_scope();

        assert!(session.close());
        assert!(!session.close());
        assert!(scope.is_cancelled());
        assert!(matches!(
            session.send(&Envelope::ping()).await,
            Err(SessionError::Closed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_blocks_until_drained_or_closed() {
        let (session, mut rx) = Session::new(None, 1);
        session.send(&Envelope::ping()).await.unwrap();

        let blocked = {
            let session = session.clone();
            tokio::spawn(async move { session.send(&Envelope::pong()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        rx.recv().await.unwrap();
        assert!(blocked.await.unwrap().is_ok());

        // Fill again, then close while a sender is parked
        let parked = {
            let session = session.clone();
            tokio::spawn(async move { session.send(&Envelope::ping()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.close();
        assert!(matches!(parked.await.unwrap(), Err(SessionError::Closed)));
    }

    #[test]
    fn blank_identity_is_anonymous() {
        let (session, _rx) = Session::new(Some(String::new()), 1);
        assert_eq!(session.identity(), None);
    }
}
