//! Broadcast target resolution
//!
//! An explicit host always wins. Otherwise the target is either the limited
//! broadcast address or the subnet broadcast of the first usable interface.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs};

use crate::config::{DiscoveryConfig, ResolveMode};
use crate::error::ResolveError;
use crate::network::interfaces::{list_interfaces, InterfaceAddr};

/// Address used to learn which local address routes off-host.
/// Nothing is sent to it.
const ROUTE_PROBE: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(10, 254, 254, 254), 1);

/// Resolved destination of every announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastEndpoint {
    pub address: Ipv4Addr,
    pub port: u16,
}

impl BroadcastEndpoint {
    pub fn limited(port: u16) -> Self {
        Self {
            address: Ipv4Addr::BROADCAST,
            port,
        }
    }

    pub fn socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.address, self.port)
    }
}

impl fmt::Display for BroadcastEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Source address policy of the broadcast socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindPolicy {
    /// The OS picks the source address and port
    Unbound,
    /// Bind to this local address with port 0 before sending
    Explicit(Ipv4Addr),
}

/// Everything needed to open the broadcast socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastTarget {
    pub endpoint: BroadcastEndpoint,
    pub bind: BindPolicy,
}

/// `ip | !mask`, octet by octet
pub fn subnet_broadcast(ip: Ipv4Addr, mask: Ipv4Addr) -> Ipv4Addr {
    let ip = ip.octets();
    let mask = mask.octets();
    Ipv4Addr::new(
        ip[0] | !mask[0],
        ip[1] | !mask[1],
        ip[2] | !mask[2],
        ip[3] | !mask[3],
    )
}

/// Pick the interface to broadcast on.
///
/// Down and loopback interfaces are skipped. The interface owning
/// `preferred` wins when present, otherwise the first candidate does.
pub fn select_interface(
    interfaces: &[InterfaceAddr],
    preferred: Option<Ipv4Addr>,
) -> Result<&InterfaceAddr, ResolveError> {
    let mut candidates = interfaces.iter().filter(|i| i.is_broadcast_candidate());
    let first = candidates.clone().next().ok_or(ResolveError::NoBroadcastInterface)?;

    Ok(preferred
        .and_then(|ip| candidates.find(|i| i.ip == ip))
        .unwrap_or(first))
}

/// Local IPv4 address the OS would use for off-host traffic.
///
/// Connecting a UDP socket only consults the routing table.
pub fn local_outbound_ip() -> Result<Ipv4Addr, ResolveError> {
    let discovery = |e: std::io::Error| ResolveError::InterfaceDiscovery(e.to_string());

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(discovery)?;
    socket
        .connect(&SockAddr::from(SocketAddr::V4(ROUTE_PROBE)))
        .map_err(discovery)?;

    let local = socket
        .local_addr()
        .map_err(discovery)?
        .as_socket_ipv4()
        .map(|addr| *addr.ip())
        .ok_or_else(|| ResolveError::InterfaceDiscovery("no IPv4 local address".into()))?;

    if local.is_unspecified() {
        return Err(ResolveError::InterfaceDiscovery("no route to the LAN".into()));
    }
    Ok(local)
}

/// Resolve an explicit host name or address to its first IPv4 address
pub fn resolve_host(host: &str, port: u16) -> Result<BroadcastEndpoint, ResolveError> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| ResolveError::HostLookup {
            host: host.to_string(),
            reason: e.to_string(),
        })?;

    addrs
        .filter_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(BroadcastEndpoint {
                address: *v4.ip(),
                port,
            }),
            SocketAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| ResolveError::NotIpv4(host.to_string()))
}

/// Subnet broadcast target from an interface list and optional local address.
///
/// The socket binds to the address of the interface that owns the broadcast
/// address, even when `local` names a different one.
pub fn subnet_target(
    interfaces: &[InterfaceAddr],
    local: Option<Ipv4Addr>,
    port: u16,
) -> Result<BroadcastTarget, ResolveError> {
    let iface = select_interface(interfaces, local)?;
    Ok(BroadcastTarget {
        endpoint: BroadcastEndpoint {
            address: iface.broadcast(),
            port,
        },
        bind: BindPolicy::Explicit(iface.ip),
    })
}

/// Resolve the broadcast target for `config`
pub fn resolve_target(config: &DiscoveryConfig) -> Result<BroadcastTarget, ResolveError> {
    if let Some(host) = config.host.as_deref() {
        let endpoint = resolve_host(host, config.port)?;
        tracing::info!(%endpoint, host, "Using explicit discovery host");
        return Ok(BroadcastTarget {
            endpoint,
            bind: BindPolicy::Unbound,
        });
    }

    let target = match config.mode {
        ResolveMode::Limited => BroadcastTarget {
            endpoint: BroadcastEndpoint::limited(config.port),
            bind: BindPolicy::Unbound,
        },
        ResolveMode::Subnet => {
            let interfaces = list_interfaces()?;
            // Fail on a host with no usable interface before probing routes.
            select_interface(&interfaces, None)?;
            let local = local_outbound_ip()?;
            subnet_target(&interfaces, Some(local), config.port)?
        }
    };

    tracing::info!(endpoint = %target.endpoint, bind = ?target.bind, "Resolved broadcast target");
    Ok(target)
}
