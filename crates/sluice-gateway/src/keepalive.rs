use std::time::Duration;

/// Largest inbound frame accepted, in bytes
pub const MAX_FRAME_BYTES: usize = 512 * 1024;
/// Idle read deadline; extended by every pong
pub const PONG_WAIT: Duration = Duration::from_secs(60);
/// Ping interval, strictly shorter than [`PONG_WAIT`]
pub const PING_PERIOD: Duration = Duration::from_secs(54);
/// Bound on any single wire write
pub const WRITE_WAIT: Duration = Duration::from_secs(10);

/// Per-connection timing limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keepalive {
    pub max_frame_bytes: usize,
    pub pong_wait: Duration,
    pub ping_period: Duration,
    pub write_wait: Duration,
}

impl Default for Keepalive {
    fn default() -> Self {
        Self {
            max_frame_bytes: MAX_FRAME_BYTES,
            pong_wait: PONG_WAIT,
            ping_period: PING_PERIOD,
            write_wait: WRITE_WAIT,
        }
    }
}

impl Keepalive {
    /// An idle but healthy peer is pinged before its read deadline passes
    pub fn is_consistent(&self) -> bool {
        self.ping_period < self.pong_wait && !self.write_wait.is_zero() && self.max_frame_bytes > 0
    }
}
