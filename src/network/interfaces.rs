//! Local IPv4 interface enumeration
//!
//! POSIX builds walk `getifaddrs`; Windows builds ask the IP helper for the
//! adapter list. Both produce the same flat [`InterfaceAddr`] records.

use std::net::Ipv4Addr;

use crate::error::ResolveError;

/// One IPv4 address assigned to a local interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddr {
    pub name: String,
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub is_up: bool,
    pub is_loopback: bool,
}

impl InterfaceAddr {
    /// Up and not loopback
    pub fn is_broadcast_candidate(&self) -> bool {
        self.is_up && !self.is_loopback && !self.ip.is_loopback()
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        super::resolver::subnet_broadcast(self.ip, self.netmask)
    }
}

/// Netmask for a CIDR prefix length
pub fn prefix_to_netmask(prefix: u8) -> Ipv4Addr {
    let bits = match prefix {
        0 => 0,
        p if p >= 32 => u32::MAX,
        p => u32::MAX << (32 - u32::from(p)),
    };
    Ipv4Addr::from(bits)
}

#[cfg(unix)]
pub fn list_interfaces() -> Result<Vec<InterfaceAddr>, ResolveError> {
    use std::ffi::CStr;

    let mut head: *mut libc::ifaddrs = std::ptr::null_mut();
    // SAFETY: getifaddrs fills `head` with a list we release with freeifaddrs.
    if unsafe { libc::getifaddrs(&mut head) } != 0 {
        return Err(ResolveError::InterfaceDiscovery(
            std::io::Error::last_os_error().to_string(),
        ));
    }

    let mut interfaces = Vec::new();
    let mut cursor = head;
    while !cursor.is_null() {
        // SAFETY: non-null entries of the list stay valid until freeifaddrs.
        let entry = unsafe { &*cursor };
        cursor = entry.ifa_next;

        if entry.ifa_addr.is_null() || entry.ifa_netmask.is_null() {
            continue;
        }
        // SAFETY: ifa_addr is non-null and points at a sockaddr.
        let family = unsafe { (*entry.ifa_addr).sa_family };
        if i32::from(family) != libc::AF_INET {
            continue;
        }

        // SAFETY: AF_INET entries carry sockaddr_in for address and mask.
        let (ip, netmask) = unsafe { (ipv4_of(entry.ifa_addr), ipv4_of(entry.ifa_netmask)) };
        let name = if entry.ifa_name.is_null() {
            String::new()
        } else {
            // SAFETY: ifa_name is a NUL-terminated C string.
            unsafe { CStr::from_ptr(entry.ifa_name) }
                .to_string_lossy()
                .into_owned()
        };

        let flags = entry.ifa_flags;
        interfaces.push(InterfaceAddr {
            name,
            ip,
            netmask,
            is_up: flags & libc::IFF_UP as libc::c_uint != 0,
            is_loopback: flags & libc::IFF_LOOPBACK as libc::c_uint != 0,
        });
    }

    // SAFETY: `head` came from a successful getifaddrs call.
    unsafe { libc::freeifaddrs(head) };
    Ok(interfaces)
}

#[cfg(unix)]
unsafe fn ipv4_of(addr: *const libc::sockaddr) -> Ipv4Addr {
    let sin = &*(addr as *const libc::sockaddr_in);
    Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr))
}

#[cfg(windows)]
pub fn list_interfaces() -> Result<Vec<InterfaceAddr>, ResolveError> {
    use windows::Win32::Foundation::{ERROR_BUFFER_OVERFLOW, NO_ERROR};
    use windows::Win32::NetworkManagement::IpHelper::{
        GetAdaptersAddresses, GAA_FLAG_SKIP_ANYCAST, GAA_FLAG_SKIP_DNS_SERVER,
        GAA_FLAG_SKIP_MULTICAST, IP_ADAPTER_ADDRESSES_LH,
    };
    use windows::Win32::NetworkManagement::Ndis::IfOperStatusUp;
    use windows::Win32::Networking::WinSock::{AF_INET, SOCKADDR_IN};

    const IF_TYPE_SOFTWARE_LOOPBACK: u32 = 24;

    let flags = GAA_FLAG_SKIP_ANYCAST | GAA_FLAG_SKIP_MULTICAST | GAA_FLAG_SKIP_DNS_SERVER;
    let mut size: u32 = 16 * 1024;
    // u64 backing keeps the adapter structs aligned.
    let mut buffer: Vec<u64>;

    loop {
        buffer = vec![0u64; (size as usize + 7) / 8];
        // SAFETY: `buffer` holds at least `size` bytes for the adapter list.
        let ret = unsafe {
            GetAdaptersAddresses(
                AF_INET.0 as u32,
                flags,
                None,
                Some(buffer.as_mut_ptr() as *mut IP_ADAPTER_ADDRESSES_LH),
                &mut size,
            )
        };
        if ret == ERROR_BUFFER_OVERFLOW.0 {
            continue;
        }
        if ret != NO_ERROR.0 {
            return Err(ResolveError::InterfaceDiscovery(format!(
                "GetAdaptersAddresses returned {}",
                ret
            )));
        }
        break;
    }

    let mut interfaces = Vec::new();
    let mut adapter = buffer.as_ptr() as *const IP_ADAPTER_ADDRESSES_LH;
    while !adapter.is_null() {
        // SAFETY: the list lives inside `buffer` for the rest of this function.
        let entry = unsafe { &*adapter };
        adapter = entry.Next;

        let name = unsafe { entry.FriendlyName.to_string() }.unwrap_or_default();
        let is_up = entry.OperStatus == IfOperStatusUp;
        let is_loopback = entry.IfType == IF_TYPE_SOFTWARE_LOOPBACK;

        let mut unicast = entry.FirstUnicastAddress;
        while !unicast.is_null() {
            let address = unsafe { &*unicast };
            unicast = address.Next;

            let sockaddr = address.Address.lpSockaddr;
            if sockaddr.is_null() || unsafe { (*sockaddr).sa_family } != AF_INET {
                continue;
            }
            let sin = unsafe { &*(sockaddr as *const SOCKADDR_IN) };
            let ip = Ipv4Addr::from(u32::from_be(unsafe { sin.sin_addr.S_un.S_addr }));

            interfaces.push(InterfaceAddr {
                name: name.clone(),
                ip,
                netmask: prefix_to_netmask(address.OnLinkPrefixLength),
                is_up,
                is_loopback,
            });
        }
    }

    Ok(interfaces)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_to_netmask() {
        assert_eq!(prefix_to_netmask(24), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(prefix_to_netmask(20), Ipv4Addr::new(255, 255, 240, 0));
        assert_eq!(prefix_to_netmask(0), Ipv4Addr::UNSPECIFIED);
        assert_eq!(prefix_to_netmask(32), Ipv4Addr::BROADCAST);
    }

    #[test]
    fn test_candidate_filter() {
        let mut iface = InterfaceAddr {
            name: "eth0".into(),
            ip: Ipv4Addr::new(10, 0, 0, 5),
            netmask: Ipv4Addr::new(255, 0, 0, 0),
            is_up: true,
            is_loopback: false,
        };
        assert!(iface.is_broadcast_candidate());
        assert_eq!(iface.broadcast(), Ipv4Addr::new(10, 255, 255, 255));

        iface.is_up = false;
        assert!(!iface.is_broadcast_candidate());
    }

    #[cfg(unix)]
    #[test]
    fn test_list_includes_loopback() {
        let interfaces = list_interfaces().unwrap();
        assert!(interfaces.iter().any(|i| i.ip == Ipv4Addr::LOCALHOST && i.is_loopback));
    }
}
