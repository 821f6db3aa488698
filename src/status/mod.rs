//! Announcement state, its ring buffer of recent logs and the wire format

pub mod ring;
pub mod state;
pub mod wire;

pub use ring::{create_shared_buffer, RingBuffer, SharedRingBuffer};
pub use state::{AnnouncementState, SharedState};
pub use wire::{Announcement, Status};
