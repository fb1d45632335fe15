//! Read and write pumps
//!
//! Each session runs exactly one of each. Either pump ending asks the
//! registry to unregister the session; the registry closes it, which makes
//! the other pump unwind and cancels every relay scoped to the session.

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use sluice_core::{Envelope, Payload};
use sluice_observability::logging::session_span;
use tokio::sync::mpsc;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::Instrument;

use crate::bridge::StreamBridge;
use crate::frame::WireFrame;
use crate::keepalive::Keepalive;
use crate::registry::SessionRegistry;
use crate::session::{SessionHandle, SEND_QUEUE_CAPACITY};

pub const UNKNOWN_MESSAGE_TYPE: &str = "Unknown message type";

/// Why a pump stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// Peer closed or the inbound stream ended
    PeerClosed,
    /// The session was torn down elsewhere
    SessionClosed,
    /// No pong within the read deadline
    ReadDeadline,
    /// A frame larger than the configured maximum
    FrameTooLarge,
    /// Transport read or write error
    TransportError,
    /// A write did not finish within the write deadline
    WriteDeadline,
}

/// Drain inbound frames until the connection or the session ends.
pub async fn read_pump<S, E>(
    session: SessionHandle,
    mut inbound: S,
    registry: SessionRegistry,
    bridge: StreamBridge,
    keepalive: Keepalive,
) -> PumpExit
where
    S: Stream<Item = Result<WireFrame, E>> + Unpin,
    E: std::fmt::Display,
{
    let span = session_span(session.id().as_str());
    async move {
        let mut deadline = Instant::now() + keepalive.pong_wait;
        let exit = loop {
            let next = tokio::select! {
                biased;
                _ = session.closed() => break PumpExit::SessionClosed,
                next = timeout_at(deadline, inbound.next()) => next,
            };
            let frame = match next {
                Err(_) => {
                    tracing::debug!("read deadline exceeded");
                    break PumpExit::ReadDeadline;
                }
                Ok(None) => break PumpExit::PeerClosed,
                Ok(Some(Err(e))) => {
                    tracing::debug!(error = %e, "read failed");
                    break PumpExit::TransportError;
                }
                Ok(Some(Ok(frame))) => frame,
            };

            if frame.data_len() > keepalive.max_frame_bytes {
                tracing::warn!(
                    len = frame.data_len(),
                    max = keepalive.max_frame_bytes,
                    "inbound frame too large"
                );
                break PumpExit::FrameTooLarge;
            }

            let data = match frame {
                WireFrame::Text(text) => text.into_bytes(),
                WireFrame::Binary(bytes) => bytes,
                WireFrame::Pong(_) => {
                    deadline = Instant::now() + keepalive.pong_wait;
                    continue;
                }
                // Transport pings are answered by the socket layer
                WireFrame::Ping(_) => continue,
                WireFrame::Close => break PumpExit::PeerClosed,
            };

            match dispatch(&session, &bridge, &data).await {
                Dispatch::Continue => {}
                Dispatch::Alive => deadline = Instant::now() + keepalive.pong_wait,
                Dispatch::Closed => break PumpExit::SessionClosed,
            }
        };

        registry.unregister(session.id()).await;
        tracing::debug!(?exit, "read pump stopped");
        exit
    }
    .instrument(span)
    .await
}

enum Dispatch {
    Continue,
    /// Inbound liveness signal
    Alive,
    Closed,
}

async fn dispatch(session: &SessionHandle, bridge: &StreamBridge, data: &[u8]) -> Dispatch {
    let envelope = match Envelope::decode(data) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(error = %e, "invalid frame");
            return match session.send(&e.to_envelope()).await {
                Ok(()) => Dispatch::Continue,
                Err(_) => Dispatch::Closed,
            };
        }
    };

    tracing::debug!(kind = %envelope.message_type(), "received message");
    let sent = match envelope.payload {
        Payload::Chat(payload) => {
            bridge.start(session.clone(), payload);
            Ok(())
        }
        Payload::Ping => session.send(&Envelope::pong()).await,
        Payload::Pong => return Dispatch::Alive,
        // Server-to-client only
        Payload::Error(_) | Payload::System(_) => session.send_error(404, UNKNOWN_MESSAGE_TYPE).await,
    };

    match sent {
        Ok(()) => Dispatch::Continue,
        Err(_) => Dispatch::Closed,
    }
}

/// Flush the outbound queue to the wire and ping the peer periodically.
pub async fn write_pump<K>(
    session: SessionHandle,
    mut outbound: mpsc::Receiver<Vec<u8>>,
    mut sink: K,
    registry: SessionRegistry,
    keepalive: Keepalive,
) -> PumpExit
where
    K: Sink<WireFrame> + Unpin,
    K::Error: std::fmt::Display,
{
    let span = session_span(session.id().as_str());
    async move {
        let mut ticker = tokio::time::interval_at(
            Instant::now() + keepalive.ping_period,
            keepalive.ping_period,
        );
        let exit = loop {
            tokio::select! {
                biased;
                _ = session.closed() => {
                    let _ = timeout(keepalive.write_wait, sink.send(WireFrame::Close)).await;
                    break PumpExit::SessionClosed;
                }
                message = outbound.recv() => {
                    let Some(first) = message else {
                        break PumpExit::SessionClosed;
                    };
                    if let Err(exit) = write_batch(&mut sink, &mut outbound, first, keepalive).await {
                        break exit;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(exit) = write_with_deadline(&mut sink, WireFrame::Ping(Vec::new()), keepalive).await {
                        break exit;
                    }
                }
            }
        };

        let _ = timeout(keepalive.write_wait, sink.close()).await;
        registry.unregister(session.id()).await;
        tracing::debug!(?exit, "write pump stopped");
        exit
    }
    .instrument(span)
    .await
}

/// Write `first` plus whatever else is already queued, one frame per
/// message, with a single flush at the end.
async fn write_batch<K>(
    sink: &mut K,
    outbound: &mut mpsc::Receiver<Vec<u8>>,
    first: Vec<u8>,
    keepalive: Keepalive,
) -> Result<(), PumpExit>
where
    K: Sink<WireFrame> + Unpin,
    K::Error: std::fmt::Display,
{
    let write = async {
        sink.feed(WireFrame::from_encoded(first)).await?;
        let mut batched = 1;
        while batched < SEND_QUEUE_CAPACITY {
            let Ok(bytes) = outbound.try_recv() else {
                break;
            };
            sink.feed(WireFrame::from_encoded(bytes)).await?;
            batched += 1;
        }
        sink.flush().await
    };
    finish_write(timeout(keepalive.write_wait, write).await)
}

async fn write_with_deadline<K>(sink: &mut K, frame: WireFrame, keepalive: Keepalive) -> Result<(), PumpExit>
where
    K: Sink<WireFrame> + Unpin,
    K::Error: std::fmt::Display,
{
    finish_write(timeout(keepalive.write_wait, sink.send(frame)).await)
}

fn finish_write<E: std::fmt::Display>(
    result: Result<Result<(), E>, tokio::time::error::Elapsed>,
) -> Result<(), PumpExit> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "write failed");
            Err(PumpExit::TransportError)
        }
        Err(_) => {
            tracing::debug!("write deadline exceeded");
            Err(PumpExit::WriteDeadline)
        }
    }
}
