//! Keepalive Tracking
//!
//! The gateway drives liveness: it sends `PING` frames and expects each one
//! echoed back unchanged. The dispatcher does the echo; this module records
//! what happened so sessions can report it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// Point-in-time view of a session's keepalive activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveSnapshot {
    /// Keepalives received.
    pub received: u64,
    /// Keepalives echoed back.
    pub echoed: u64,
    /// Time since the last inbound frame of any kind.
    pub idle: Duration,
    /// Time since the last keepalive, if one has arrived.
    pub since_keepalive: Option<Duration>,
}

impl KeepaliveSnapshot {
    /// Keepalives that were received but never echoed.
    #[must_use]
    pub const fn unanswered(&self) -> u64 {
        self.received.saturating_sub(self.echoed)
    }
}

/// Keepalive and inbound activity state for one session.
#[derive(Debug)]
pub struct KeepaliveState {
    last_inbound: RwLock<Instant>,
    last_keepalive: RwLock<Option<Instant>>,
    received: AtomicU64,
    echoed: AtomicU64,
}

impl Default for KeepaliveState {
    fn default() -> Self {
        Self::new()
    }
}

impl KeepaliveState {
    /// Create new keepalive state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_inbound: RwLock::new(Instant::now()),
            last_keepalive: RwLock::new(None),
            received: AtomicU64::new(0),
            echoed: AtomicU64::new(0),
        }
    }

    /// Record any inbound frame.
    pub fn record_inbound(&self) {
        *self.last_inbound.write() = Instant::now();
    }

    /// Record a keepalive frame received.
    pub fn record_keepalive(&self) {
        let now = Instant::now();
        *self.last_inbound.write() = now;
        *self.last_keepalive.write() = Some(now);
        self.received.fetch_add(1, Ordering::SeqCst);
    }

    /// Record a keepalive echoed back.
    pub fn record_echo(&self) {
        self.echoed.fetch_add(1, Ordering::SeqCst);
    }

    /// Keepalives received so far.
    #[must_use]
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::SeqCst)
    }

    /// Keepalives echoed so far.
    #[must_use]
    pub fn echoed(&self) -> u64 {
        self.echoed.load(Ordering::SeqCst)
    }

    /// Time since the last inbound frame of any kind.
    #[must_use]
    pub fn time_since_inbound(&self) -> Duration {
        self.last_inbound.read().elapsed()
    }

    /// Time since the last keepalive, if one has arrived.
    #[must_use]
    pub fn time_since_keepalive(&self) -> Option<Duration> {
        self.last_keepalive.read().map(|at| at.elapsed())
    }
    /// Capture the current counters and times.
    #[must_use]
    pub fn snapshot(&self) -> KeepaliveSnapshot {
        KeepaliveSnapshot {
            received: self.received(),
            echoed: self.echoed(),
            idle: self.time_since_inbound(),
            since_keepalive: self.time_since_keepalive(),
        }
    }
}
