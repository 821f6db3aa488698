//! POSIX broadcast socket over libc

use std::io;
use std::mem;
use std::net::SocketAddrV4;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use super::BroadcastSender;
use crate::error::NetworkError;
use crate::network::resolver::{BindPolicy, BroadcastTarget};

/// UDP socket with `SO_BROADCAST` set, sending to one destination
pub struct RawBroadcastSocket {
    fd: OwnedFd,
    destination: SocketAddrV4,
    dest_raw: libc::sockaddr_in,
}

impl RawBroadcastSocket {
    pub fn open(target: &BroadcastTarget) -> Result<Self, NetworkError> {
        // SAFETY: plain socket(2) call; the result is checked below.
        let raw = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, libc::IPPROTO_UDP) };
        if raw < 0 {
            return Err(NetworkError::SocketCreate(io::Error::last_os_error().to_string()));
        }
        // SAFETY: `raw` is a fresh descriptor owned by nothing else.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let enable: libc::c_int = 1;
        // SAFETY: optval points at a c_int of the advertised length.
        let rc = unsafe {
            libc::setsockopt(
                fd.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_BROADCAST,
                &enable as *const libc::c_int as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            return Err(NetworkError::SetBroadcast(io::Error::last_os_error().to_string()));
        }

        if let BindPolicy::Explicit(local) = target.bind {
            let addr = sockaddr_in(SocketAddrV4::new(local, 0));
            // SAFETY: addr is a valid sockaddr_in for the length passed.
            let rc = unsafe {
                libc::bind(
                    fd.as_raw_fd(),
                    &addr as *const libc::sockaddr_in as *const libc::sockaddr,
                    mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
                )
            };
            if rc != 0 {
                return Err(NetworkError::Bind(format!(
                    "{}: {}",
                    local,
                    io::Error::last_os_error()
                )));
            }
        }

        let destination = target.endpoint.socket_addr();
        Ok(Self {
            fd,
            destination,
            dest_raw: sockaddr_in(destination),
        })
    }
}

impl BroadcastSender for RawBroadcastSocket {
    fn send(&self, payload: &[u8]) -> Result<usize, NetworkError> {
        // SAFETY: payload and dest_raw outlive the call.
        let sent = unsafe {
            libc::sendto(
                self.fd.as_raw_fd(),
                payload.as_ptr() as *const libc::c_void,
                payload.len(),
                0,
                &self.dest_raw as *const libc::sockaddr_in as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        if sent < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EMSGSIZE) {
                return Err(NetworkError::PacketTooLarge(payload.len()));
            }
            return Err(NetworkError::Send(format!("{}: {}", self.destination, err)));
        }
        Ok(sent as usize)
    }

    fn destination(&self) -> SocketAddrV4 {
        self.destination
    }
}

fn sockaddr_in(addr: SocketAddrV4) -> libc::sockaddr_in {
    // SAFETY: sockaddr_in is plain old data; all-zero is a valid value.
    let mut raw: libc::sockaddr_in = unsafe { mem::zeroed() };
    raw.sin_family = libc::AF_INET as libc::sa_family_t;
    raw.sin_port = addr.port().to_be();
    raw.sin_addr = libc::in_addr {
        s_addr: u32::from(*addr.ip()).to_be(),
    };
    #[cfg(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    ))]
    {
        raw.sin_len = mem::size_of::<libc::sockaddr_in>() as u8;
    }
    raw
}
