//! Raw broadcast sockets
//!
//! Each platform family gets its own implementation of the same three
//! steps: create a UDP socket, enable `SO_BROADCAST`, optionally bind, then
//! `sendto` the computed destination. The heartbeat only sees the
//! [`BroadcastSender`] trait.

use std::net::SocketAddrV4;
use std::sync::Arc;

use crate::error::NetworkError;
use crate::network::resolver::BroadcastTarget;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::RawBroadcastSocket;

#[cfg(windows)]
mod winsock;
#[cfg(windows)]
pub use winsock::RawBroadcastSocket;

/// Capability to send one datagram to a fixed broadcast destination
pub trait BroadcastSender: Send + Sync {
    /// Send `payload` as a single datagram, returning the bytes written
    fn send(&self, payload: &[u8]) -> Result<usize, NetworkError>;

    fn destination(&self) -> SocketAddrV4;
}

impl<T: BroadcastSender + ?Sized> BroadcastSender for Arc<T> {
    fn send(&self, payload: &[u8]) -> Result<usize, NetworkError> {
        (**self).send(payload)
    }

    fn destination(&self) -> SocketAddrV4 {
        (**self).destination()
    }
}

/// Open the platform broadcast socket for `target`
pub fn open_broadcast_socket(target: &BroadcastTarget) -> Result<RawBroadcastSocket, NetworkError> {
    let socket = RawBroadcastSocket::open(target)?;
    tracing::info!(
        destination = %socket.destination(),
        bind = ?target.bind,
        "Opened broadcast socket"
    );
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::resolver::{BindPolicy, BroadcastEndpoint};
    use std::net::{Ipv4Addr, UdpSocket};
    use std::time::Duration;

    fn loopback_receiver() -> (UdpSocket, u16) {
        let receiver = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let port = receiver.local_addr().unwrap().port();
        (receiver, port)
    }

    #[test]
    fn test_unbound_send() {
        let (receiver, port) = loopback_receiver();
        let socket = open_broadcast_socket(&BroadcastTarget {
            endpoint: BroadcastEndpoint {
                address: Ipv4Addr::LOCALHOST,
                port,
            },
            bind: BindPolicy::Unbound,
        })
        .unwrap();

        assert_eq!(socket.send(b"hello").unwrap(), 5);

        let mut buf = [0u8; 64];
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"hello");
    }

    #[test]
    fn test_explicit_bind_sets_source() {
        let (receiver, port) = loopback_receiver();
        let socket = open_broadcast_socket(&BroadcastTarget {
            endpoint: BroadcastEndpoint {
                address: Ipv4Addr::LOCALHOST,
                port,
            },
            bind: BindPolicy::Explicit(Ipv4Addr::LOCALHOST),
        })
        .unwrap();

        socket.send(b"bound").unwrap();

        let mut buf = [0u8; 64];
        let (len, from) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"bound");
        assert_eq!(from.ip(), Ipv4Addr::LOCALHOST);
    }

    #[cfg(unix)]
    #[test]
    fn test_limited_broadcast_send() {
        let (_receiver, port) = loopback_receiver();
        let socket = open_broadcast_socket(&BroadcastTarget {
            endpoint: BroadcastEndpoint::limited(port),
            bind: BindPolicy::Unbound,
        })
        .unwrap();

        assert_eq!(socket.destination(), SocketAddrV4::new(Ipv4Addr::BROADCAST, port));
        assert_eq!(socket.send(b"x").unwrap(), 1);

        // Without SO_BROADCAST the kernel refuses the same destination.
        let plain = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
        assert!(plain.send_to(b"x", (Ipv4Addr::BROADCAST, port)).is_err());
    }

    #[test]
    fn test_bind_to_foreign_address_fails() {
        let result = RawBroadcastSocket::open(&BroadcastTarget {
            endpoint: BroadcastEndpoint::limited(9),
            // TEST-NET-3, never assigned to a local interface
            bind: BindPolicy::Explicit(Ipv4Addr::new(203, 0, 113, 7)),
        });
        assert!(matches!(result, Err(NetworkError::Bind(_))));
    }
}
