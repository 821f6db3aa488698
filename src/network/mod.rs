//! Network subsystem: interface discovery, target resolution and the raw
//! broadcast socket

pub mod interfaces;
pub mod raw;
pub mod resolver;

pub use interfaces::{list_interfaces, InterfaceAddr};
pub use raw::{open_broadcast_socket, BroadcastSender, RawBroadcastSocket};
pub use resolver::{
    local_outbound_ip, resolve_target, subnet_broadcast, BindPolicy, BroadcastEndpoint,
    BroadcastTarget,
};
