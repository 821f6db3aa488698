//! Log capture: events, their sources and the readiness watcher

pub mod child;
pub mod event;
pub mod tap;
pub mod watcher;

pub use child::ChildCollector;
pub use event::{log_channel, receiver_stream, LogEvent, LogEventReceiver, LogEventSender};
pub use tap::LogTap;
pub use watcher::LogWatcher;
