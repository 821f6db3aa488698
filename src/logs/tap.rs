//! `tracing` layer feeding the log watcher
//!
//! Installed next to the fmt layer, it turns every recorded event into a
//! [`LogEvent`] on the watcher's channel.

use std::fmt::{self, Write as _};

use chrono::Utc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::logs::event::{LogEvent, LogEventSender};

/// Target prefix of events emitted by this crate
pub const SELF_TARGET: &str = env!("CARGO_CRATE_NAME");

/// Forwards tracing events into a [`LogEventSender`]
pub struct LogTap {
    tx: LogEventSender,
    ignored_targets: Vec<String>,
}

impl LogTap {
    /// Tap that skips the beacon's own events
    pub fn new(tx: LogEventSender) -> Self {
        Self {
            tx,
            ignored_targets: vec![SELF_TARGET.to_string()],
        }
    }

    /// Tap that forwards everything
    pub fn capture_all(tx: LogEventSender) -> Self {
        Self {
            tx,
            ignored_targets: Vec::new(),
        }
    }

    pub fn ignore_target(mut self, prefix: impl Into<String>) -> Self {
        self.ignored_targets.push(prefix.into());
        self
    }

    fn is_ignored(&self, target: &str) -> bool {
        self.ignored_targets.iter().any(|prefix| target.starts_with(prefix.as_str()))
    }
}

impl<S: Subscriber> Layer<S> for LogTap {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if self.is_ignored(metadata.target()) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        // The watcher may already be gone during shutdown.
        let _ = self.tx.send(LogEvent {
            message: visitor.finish(),
            level: metadata.level().to_string(),
            target: metadata.target().to_string(),
            timestamp: Utc::now(),
        });
    }
}

/// Collects the `message` field plus any structured fields as `key=value`
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }

    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={}", name, value);
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field.name(), format_args!("{}", value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            self.push_field(field.name(), format_args!("{:?}", value));
        }
    }
}
