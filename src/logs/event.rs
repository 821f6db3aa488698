//! Log events observed by the watcher and carried in announcements

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single diagnostic log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub level: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl LogEvent {
    /// Event stamped with the current time and no level or target
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: String::new(),
            target: String::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }
}

/// Producer half of the watcher's event channel
pub type LogEventSender = tokio::sync::mpsc::UnboundedSender<LogEvent>;

/// Consumer half of the watcher's event channel
pub type LogEventReceiver = tokio::sync::mpsc::UnboundedReceiver<LogEvent>;

/// Create the unbounded channel log sources write into
pub fn log_channel() -> (LogEventSender, LogEventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// Adapt a channel receiver into a `Stream` for the watcher
pub fn receiver_stream(
    mut rx: LogEventReceiver,
) -> impl futures_util::Stream<Item = LogEvent> + Unpin {
    futures_util::stream::poll_fn(move |cx| rx.poll_recv(cx))
}
