//! Receiver counters shared by the listener and its sessions

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for the receiver
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections: AtomicU64,
    pub active_sessions: AtomicU64,
    pub events_delivered: AtomicU64,
    pub decode_errors: AtomicU64,
    pub handler_timeouts: AtomicU64,
    pub bytes_received: AtomicU64,
}

/// Point-in-time copy of [`ServerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connections: u64,
    pub active_sessions: u64,
    pub events_delivered: u64,
    pub decode_errors: u64,
    pub handler_timeouts: u64,
    pub bytes_received: u64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections: self.connections.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            handler_timeouts: self.handler_timeouts.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn session_opened(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn session_closed(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let stats = ServerStats::new();
        stats.connections.fetch_add(2, Ordering::Relaxed);
        stats.session_opened();
        stats.session_opened();
        stats.session_closed();
        stats.bytes_received.fetch_add(27, Ordering::Relaxed);

        let snap = stats.snapshot();
        assert_eq!(snap.connections, 2);
        assert_eq!(snap.active_sessions, 1);
        assert_eq!(snap.bytes_received, 27);
        assert_eq!(snap.events_delivered, 0);
    }
}
