//! Windows broadcast socket over WinSock

use std::net::SocketAddrV4;
use std::sync::Once;

use windows::Win32::Networking::WinSock::{
    bind, closesocket, sendto, setsockopt, socket, WSAGetLastError, WSAStartup, AF_INET,
    INVALID_SOCKET, IN_ADDR, IN_ADDR_0, IPPROTO_UDP, SOCKADDR, SOCKADDR_IN, SOCKET,
    SOCKET_ERROR, SOCK_DGRAM, SOL_SOCKET, SO_BROADCAST, WSADATA, WSAEMSGSIZE,
};

use super::BroadcastSender;
use crate::error::NetworkError;
use crate::network::resolver::{BindPolicy, BroadcastTarget};

static WINSOCK_INIT: Once = Once::new();

fn ensure_winsock() {
    WINSOCK_INIT.call_once(|| {
        let mut data = WSADATA::default();
        // SAFETY: WSAStartup only writes into `data`. Version 2.2.
        unsafe {
            WSAStartup(0x0202, &mut data);
        }
    });
}

fn last_error() -> String {
    // SAFETY: reads thread-local WinSock error state.
    let code = unsafe { WSAGetLastError() };
    format!("WSA error {}", code.0)
}

/// UDP socket with `SO_BROADCAST` set, sending to one destination
pub struct RawBroadcastSocket {
    socket: SOCKET,
    destination: SocketAddrV4,
    dest_raw: SOCKADDR_IN,
}

// SOCKET is a plain handle; WinSock sends are thread-safe.
unsafe impl Send for RawBroadcastSocket {}
unsafe impl Sync for RawBroadcastSocket {}

impl RawBroadcastSocket {
    pub fn open(target: &BroadcastTarget) -> Result<Self, NetworkError> {
        ensure_winsock();

        // SAFETY: plain socket call; checked against INVALID_SOCKET.
        let socket = unsafe { socket(AF_INET.0 as i32, SOCK_DGRAM, IPPROTO_UDP.0) };
        if socket == INVALID_SOCKET {
            return Err(NetworkError::SocketCreate(last_error()));
        }
        let guard = SocketGuard(socket);

        let enable: i32 = 1;
        // SAFETY: the option buffer is a live i32.
        let rc = unsafe { setsockopt(socket, SOL_SOCKET, SO_BROADCAST, Some(&enable.to_ne_bytes())) };
        if rc == SOCKET_ERROR {
            return Err(NetworkError::SetBroadcast(last_error()));
        }

        if let BindPolicy::Explicit(local) = target.bind {
            let addr = sockaddr_in(SocketAddrV4::new(local, 0));
            // SAFETY: addr is a valid SOCKADDR_IN for the length passed.
            let rc = unsafe {
                bind(
                    socket,
                    &addr as *const SOCKADDR_IN as *const SOCKADDR,
                    std::mem::size_of::<SOCKADDR_IN>() as i32,
                )
            };
            if rc == SOCKET_ERROR {
                return Err(NetworkError::Bind(format!("{}: {}", local, last_error())));
            }
        }

        std::mem::forget(guard);
        let destination = target.endpoint.socket_addr();
        Ok(Self {
            socket,
            destination,
            dest_raw: sockaddr_in(destination),
        })
    }
}

impl BroadcastSender for RawBroadcastSocket {
    fn send(&self, payload: &[u8]) -> Result<usize, NetworkError> {
        // SAFETY: payload and dest_raw outlive the call.
        let sent = unsafe {
            sendto(
                self.socket,
                payload,
                0,
                &self.dest_raw as *const SOCKADDR_IN as *const SOCKADDR,
                std::mem::size_of::<SOCKADDR_IN>() as i32,
            )
        };
        if sent == SOCKET_ERROR {
            // SAFETY: reads thread-local WinSock error state.
            if unsafe { WSAGetLastError() } == WSAEMSGSIZE {
                return Err(NetworkError::PacketTooLarge(payload.len()));
            }
            return Err(NetworkError::Send(format!("{}: {}", self.destination, last_error())));
        }
        Ok(sent as usize)
    }

    fn destination(&self) -> SocketAddrV4 {
        self.destination
    }
}

impl Drop for RawBroadcastSocket {
    fn drop(&mut self) {
        // SAFETY: the socket is owned by this value and closed once.
        unsafe {
            closesocket(self.socket);
        }
    }
}

/// Closes a half-configured socket on early return
struct SocketGuard(SOCKET);

impl Drop for SocketGuard {
    fn drop(&mut self) {
        // SAFETY: only reached when ownership never moved to RawBroadcastSocket.
        unsafe {
            closesocket(self.0);
        }
    }
}

fn sockaddr_in(addr: SocketAddrV4) -> SOCKADDR_IN {
    SOCKADDR_IN {
        sin_family: AF_INET,
        sin_port: addr.port().to_be(),
        sin_addr: IN_ADDR {
            S_un: IN_ADDR_0 {
                S_addr: u32::from(*addr.ip()).to_be(),
            },
        },
        sin_zero: [0; 8],
    }
}
