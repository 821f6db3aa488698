//! Receiving side of the announcement protocol
//!
//! Binds the discovery port with address reuse so several consumers on one
//! host can listen at once, decodes announcements and filters out stale
//! datagrams from processes that are no longer alive.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::constants::{MAX_DATAGRAM_SIZE, RECEIVE_BUFFER_SIZE};
use crate::error::{NetworkError, Result};
use crate::status::{Announcement, Status};

/// A collector seen on the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorStatus {
    pub is_ready: bool,
    pub status: Status,
    pub pid: u32,
    pub version: String,
    pub otlp_endpoint: String,
    pub source: SocketAddr,
}

impl CollectorStatus {
    fn from_announcement(announcement: Announcement, source: SocketAddr) -> Self {
        Self {
            is_ready: announcement.status.is_ready(),
            status: announcement.status,
            pid: announcement.pid,
            version: announcement.version,
            otlp_endpoint: announcement.otlp_endpoint,
            source,
        }
    }
}

/// Listens for announcements on the discovery port
pub struct DiscoveryListener {
    socket: UdpSocket,
    buffer: Vec<u8>,
    check_liveness: bool,
}

impl DiscoveryListener {
    /// Bind `0.0.0.0:port`. Must be called within a tokio runtime.
    pub fn bind(port: u16) -> Result<Self> {
        Self::bind_addr(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))
    }

    pub fn bind_addr(addr: SocketAddrV4) -> Result<Self> {
        let bind_err = |e: std::io::Error| NetworkError::Bind(format!("{}: {}", addr, e));

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| NetworkError::SocketCreate(e.to_string()))?;
        socket.set_reuse_address(true).map_err(bind_err)?;
        #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
        socket.set_reuse_port(true).map_err(bind_err)?;
        socket
            .set_broadcast(true)
            .map_err(|e| NetworkError::SetBroadcast(e.to_string()))?;
        socket
            .set_recv_buffer_size(RECEIVE_BUFFER_SIZE)
            .map_err(bind_err)?;
        socket.set_nonblocking(true).map_err(bind_err)?;
        socket
            .bind(&SockAddr::from(SocketAddr::V4(addr)))
            .map_err(bind_err)?;

        let socket = UdpSocket::from_std(socket.into())?;
        tracing::info!(address = %addr, "Discovery listener bound");

        Ok(Self {
            socket,
            buffer: vec![0u8; MAX_DATAGRAM_SIZE],
            check_liveness: true,
        })
    }

    /// Skip the process liveness check, for announcements from other hosts
    pub fn without_liveness_check(mut self) -> Self {
        self.check_liveness = false;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Wait up to `wait` for one datagram and decode it.
    ///
    /// `Ok(None)` means nothing arrived in time.
    pub async fn recv_announcement(
        &mut self,
        wait: Duration,
    ) -> Result<Option<(Announcement, SocketAddr)>> {
        let received = tokio::time::timeout(wait, self.socket.recv_from(&mut self.buffer)).await;
        let (len, source) = match received {
            Err(_) => return Ok(None),
            Ok(result) => result.map_err(|e| NetworkError::Receive(e.to_string()))?,
        };

        let announcement = Announcement::decode(&self.buffer[..len])
            .map_err(|e| NetworkError::InvalidPacket(e.to_string()))?;
        Ok(Some((announcement, source)))
    }

    /// Next announcement from a live process, skipping undecodable datagrams
    async fn next_live(&mut self, wait: Duration) -> Result<Option<CollectorStatus>> {
        match self.recv_announcement(wait).await {
            Ok(Some((announcement, source))) => {
                if self.check_liveness && !process_alive(announcement.pid) {
                    tracing::debug!(pid = announcement.pid, "Ignoring announcement from dead process");
                    return Ok(None);
                }
                Ok(Some(CollectorStatus::from_announcement(announcement, source)))
            }
            Ok(None) => Ok(None),
            Err(crate::error::Error::Network(NetworkError::InvalidPacket(reason))) => {
                tracing::debug!("Ignoring malformed announcement: {}", reason);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// First live collector announcing `version`, trying `attempts` times
    pub async fn find_collector(
        &mut self,
        version: &str,
        attempts: usize,
        delay: Duration,
    ) -> Result<Option<CollectorStatus>> {
        for _ in 0..attempts {
            if let Some(collector) = self.next_live(delay).await? {
                if collector.version == version {
                    return Ok(Some(collector));
                }
                tracing::debug!(
                    found = %collector.version,
                    wanted = version,
                    "Skipping collector with a different version"
                );
            }
        }
        Ok(None)
    }

    /// One entry per distinct version seen over `attempts` receives.
    ///
    /// Collectors compete for the same port, so a short window may miss some.
    pub async fn running_collectors(
        &mut self,
        attempts: usize,
        delay: Duration,
    ) -> Result<Vec<CollectorStatus>> {
        let mut results: Vec<CollectorStatus> = Vec::new();
        for _ in 0..attempts {
            if let Some(collector) = self.next_live(delay).await? {
                if !results.iter().any(|r| r.version == collector.version) {
                    results.push(collector);
                }
            }
        }
        Ok(results)
    }
}

/// Whether a process with `pid` exists on this host
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 only performs the existence and permission check.
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Whether a process with `pid` exists on this host
#[cfg(windows)]
pub fn process_alive(pid: u32) -> bool {
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

    // SAFETY: the handle is closed right after the existence check.
    unsafe {
        match OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) {
            Ok(handle) => {
                let _ = CloseHandle(handle);
                true
            }
            Err(_) => false,
        }
    }
}
