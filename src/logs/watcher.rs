//! Log watcher and readiness detection
//!
//! Every observed event is appended to the announcement's recent logs. The
//! first message containing the readiness marker moves the status to
//! `READY`; nothing moves it back.

use futures_util::{Stream, StreamExt};

use crate::logs::event::LogEvent;
use crate::logs::tap::SELF_TARGET;
use crate::shutdown::ShutdownListener;
use crate::status::SharedState;

pub struct LogWatcher {
    state: SharedState,
    marker: String,
}

impl LogWatcher {
    pub fn new(state: SharedState, marker: impl Into<String>) -> Self {
        Self {
            state,
            marker: marker.into(),
        }
    }

    /// Record one event. Returns true if this event made the collector ready.
    ///
    /// Events emitted by the beacon itself are recorded but never count as
    /// the readiness marker.
    pub fn observe(&self, event: LogEvent) -> bool {
        let matched = !event.target.starts_with(SELF_TARGET)
            && event.message.contains(self.marker.as_str());
        self.state.record_log(event);

        if matched && self.state.mark_ready() {
            tracing::info!(pid = self.state.pid(), "Readiness marker observed, collector is READY");
            return true;
        }
        false
    }

    /// Consume `events` until the stream ends or shutdown is signalled
    pub async fn run<S>(self, mut events: S, mut shutdown: ShutdownListener)
    where
        S: Stream<Item = LogEvent> + Unpin,
    {
        tracing::debug!(marker_len = self.marker.len(), "Log watcher started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    tracing::debug!("Log watcher cancelled");
                    break;
                }
                next = events.next() => match next {
                    Some(event) => {
                        self.observe(event);
                    }
                    None => {
                        tracing::debug!("Log event stream closed");
                        break;
                    }
                },
            }
        }

        if !self.state.status().is_ready() {
            tracing::warn!("Log watcher stopped before the readiness marker was seen");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::event::{log_channel, receiver_stream};
    use crate::shutdown::shutdown_channel;
    use crate::status::{AnnouncementState, Status};
    use crate::logs::tap::LogTap;
    use std::sync::Arc;
    use std::time::Duration;
    use tracing_subscriber::layer::SubscriberExt;

    const MARKER: &str = "Everything is ready";

    fn watcher(capacity: usize) -> (LogWatcher, SharedState) {
        let state = Arc::new(AnnouncementState::new("v", "", capacity));
        (LogWatcher::new(state.clone(), MARKER), state)
    }

    #[test]
    fn test_marker_flips_ready() {
        let (watcher, state) = watcher(8);

        assert!(!watcher.observe(LogEvent::new("Starting extensions")));
        assert_eq!(state.status(), Status::NotReady);

        assert!(watcher.observe(LogEvent::new("Everything is ready. Begin running and processing data.")));
        assert_eq!(state.status(), Status::Ready);

        assert!(!watcher.observe(LogEvent::new("Shutdown requested")));
        assert_eq!(state.status(), Status::Ready);
        assert_eq!(state.recent_logs().len(), 3);
    }

    #[test]
    fn test_marker_is_case_sensitive() {
        let (watcher, state) = watcher(8);
        watcher.observe(LogEvent::new("everything is ready"));
        assert_eq!(state.status(), Status::NotReady);
    }

    #[tokio::test]
    async fn test_run_ends_with_stream() {
        let (watcher, state) = watcher(8);
        let (tx, rx) = log_channel();
        let (_trigger, listener) = shutdown_channel();

        tx.send(LogEvent::new("booting")).unwrap();
        tx.send(LogEvent::new(MARKER)).unwrap();
        drop(tx);

        watcher.run(receiver_stream(rx), listener).await;

        assert_eq!(state.status(), Status::Ready);
        assert_eq!(state.recent_logs().len(), 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (watcher, state) = watcher(8);
        let (_tx, rx) = log_channel();
        let (trigger, listener) = shutdown_channel();

        let task = tokio::spawn(watcher.run(receiver_stream(rx), listener));
        trigger.trigger();
        task.await.unwrap();

        assert_eq!(state.status(), Status::NotReady);
    }

    #[test]
    fn test_own_target_never_marks_ready() {
        let (watcher, state) = watcher(8);

        let own = LogEvent::new(MARKER).with_target(format!("{}::heartbeat", SELF_TARGET));
        assert!(!watcher.observe(own));
        assert_eq!(state.status(), Status::NotReady);
        assert_eq!(state.recent_logs().len(), 1);

        assert!(watcher.observe(LogEvent::new(MARKER).with_target("otelcol")));
    }

    #[tokio::test]
    async fn test_captured_self_logs_stay_not_ready() {
        let (tx, rx) = log_channel();
        let subscriber = tracing_subscriber::registry().with(LogTap::capture_all(tx));
        let _guard = tracing::subscriber::set_default(subscriber);

        let (watcher, state) = watcher(8);
        let (_trigger, listener) = shutdown_channel();

        tracing::info!("{}", MARKER);
        let _ = tokio::time::timeout(
            Duration::from_millis(50),
            watcher.run(receiver_stream(rx), listener),
        )
        .await;

        assert_eq!(state.status(), Status::NotReady);
        assert!(state.recent_logs().len() >= 2);
    }
}
