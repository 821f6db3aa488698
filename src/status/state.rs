//! Shared announcement state
//!
//! The watcher flips the status and appends log lines; the heartbeat takes a
//! snapshot every tick. Status lives in an atomic and only moves forward.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::logs::LogEvent;
use crate::status::ring::RingBuffer;
use crate::status::wire::{Announcement, Status};

/// Mutable record behind every announcement
pub struct AnnouncementState {
    status: AtomicU8,
    pid: u32,
    version: String,
    otlp_endpoint: String,
    recent_logs: RingBuffer<LogEvent>,
}

impl AnnouncementState {
    /// Fresh state in `NOT_READY` for the current process
    pub fn new(
        version: impl Into<String>,
        otlp_endpoint: impl Into<String>,
        log_capacity: usize,
    ) -> Self {
        Self::with_pid(std::process::id(), version, otlp_endpoint, log_capacity)
    }

    pub fn with_pid(
        pid: u32,
        version: impl Into<String>,
        otlp_endpoint: impl Into<String>,
        log_capacity: usize,
    ) -> Self {
        Self {
            status: AtomicU8::new(Status::NotReady.ordinal()),
            pid,
            version: version.into(),
            otlp_endpoint: otlp_endpoint.into(),
            recent_logs: RingBuffer::new(log_capacity),
        }
    }

    pub fn status(&self) -> Status {
        Status::from_ordinal(self.status.load(Ordering::Acquire))
    }

    /// Move to `READY`. Returns true only for the call that made the change.
    pub fn mark_ready(&self) -> bool {
        let previous = self
            .status
            .fetch_max(Status::Ready.ordinal(), Ordering::AcqRel);
        previous < Status::Ready.ordinal()
    }

    pub fn record_log(&self, event: LogEvent) {
        self.recent_logs.push(event);
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn otlp_endpoint(&self) -> &str {
        &self.otlp_endpoint
    }

    pub fn recent_logs(&self) -> &RingBuffer<LogEvent> {
        &self.recent_logs
    }

    /// Immutable wire record of the current state
    pub fn snapshot(&self) -> Announcement {
        Announcement {
            status: self.status(),
            pid: self.pid,
            version: self.version.clone(),
            otlp_endpoint: self.otlp_endpoint.clone(),
            logs: self.recent_logs.snapshot(),
        }
    }
}

/// Handle shared between the watcher and the heartbeat
pub type SharedState = Arc<AnnouncementState>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_snapshot() {
        let state = AnnouncementState::with_pid(99, "1.2.3", "localhost:4318", 4);
        let snap = state.snapshot();

        assert_eq!(snap.status, Status::NotReady);
        assert_eq!(snap.pid, 99);
        assert_eq!(snap.version, "1.2.3");
        assert_eq!(snap.otlp_endpoint, "localhost:4318");
        assert!(snap.logs.is_empty());
    }

    #[test]
    fn test_mark_ready_once() {
        let state = AnnouncementState::new("v", "", 4);
        assert!(state.mark_ready());
        assert!(!state.mark_ready());
        assert_eq!(state.status(), Status::Ready);
    }

    #[test]
    fn test_snapshot_carries_logs() {
        let state = AnnouncementState::new("v", "", 2);
        state.record_log(LogEvent::new("one"));
        state.record_log(LogEvent::new("two"));
        state.record_log(LogEvent::new("three"));

        let messages: Vec<String> = state.snapshot().logs.into_iter().map(|l| l.message).collect();
        assert_eq!(messages, vec!["two", "three"]);
    }
}
