//! Network interface lookup
//!
//! The loopback interface is found once per process and cached. Hosts do not
//! always enable multicast on loopback, so discovery tries to turn it on;
//! that needs CAP_NET_ADMIN and failure is logged, not fatal.

use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::OnceLock;

use nix::ifaddrs::getifaddrs;
use nix::net::if_::{if_nametoindex, InterfaceFlags};
use tracing::{error, info, warn};

use super::unspecified_like;
use crate::error::NetworkError;

/// The host's loopback interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loopback {
    pub name: String,
    pub index: u32,
}

static LOOPBACK: OnceLock<Option<Loopback>> = OnceLock::new();

/// Loopback interface name and index, discovered on first use
pub fn loopback() -> Result<&'static Loopback, NetworkError> {
    LOOPBACK
        .get_or_init(discover_loopback)
        .as_ref()
        .ok_or(NetworkError::NoLoopback)
}

fn discover_loopback() -> Option<Loopback> {
    let addrs = match getifaddrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            error!(error = %e, "getifaddrs failed, no loopback interface");
            return None;
        }
    };
    let Some(lo) = addrs
        .into_iter()
        .find(|a| a.flags.contains(InterfaceFlags::IFF_LOOPBACK))
    else {
        error!("no loopback interface found");
        return None;
    };
    let index = interface_index(&lo.interface_name)?;

    if !lo.flags.contains(InterfaceFlags::IFF_MULTICAST) {
        match enable_multicast(&lo.interface_name, lo.flags) {
            Ok(()) => info!(iface = %lo.interface_name, "multicast enabled on loopback"),
            Err(e) => warn!(
                iface = %lo.interface_name,
                error = %e,
                "cannot enable multicast on loopback; run 'ip link set dev {} multicast on'",
                lo.interface_name
            ),
        }
    }
    Some(Loopback {
        name: lo.interface_name,
        index,
    })
}

#[cfg(target_os = "linux")]
fn enable_multicast(name: &str, flags: InterfaceFlags) -> std::io::Result<()> {
    use socket2::{Domain, Socket, Type};
    use std::os::fd::AsRawFd;

    let sock = Socket::new(Domain::IPV4, Type::DGRAM, None)?;
    // SAFETY: ifreq is plain data; all-zero is a valid starting value
    let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
    for (dst, src) in ifr
        .ifr_name
        .iter_mut()
        .zip(name.bytes().take(libc::IFNAMSIZ - 1))
    {
        *dst = src as libc::c_char;
    }
    ifr.ifr_ifru.ifru_flags = (flags | InterfaceFlags::IFF_MULTICAST).bits() as libc::c_short;
    // SAFETY: SIOCSIFFLAGS reads a fully initialised ifreq
    let r = unsafe { libc::ioctl(sock.as_raw_fd(), libc::SIOCSIFFLAGS as _, &ifr) };
    if r < 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
fn enable_multicast(_name: &str, _flags: InterfaceFlags) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "setting interface flags is only implemented on Linux",
    ))
}

/// Interface index for a name, `None` if there is no such interface
pub fn interface_index(name: &str) -> Option<u32> {
    match if_nametoindex(name) {
        Ok(0) | Err(_) => None,
        Ok(index) => Some(index),
    }
}

/// Local address the kernel would use to reach `dest`.
///
/// Connecting a UDP socket selects a route without sending anything.
pub fn local_address_for(dest: &SocketAddr) -> Option<IpAddr> {
    let mut target = *dest;
    if target.port() == 0 {
        target.set_port(1);
    }
    let sock = UdpSocket::bind(unspecified_like(dest)).ok()?;
    sock.connect(target).ok()?;
    let local = sock.local_addr().ok()?.ip();
    (!local.is_unspecified()).then_some(local)
}

/// Index of the interface the default route uses to reach `dest`
pub fn interface_for_destination(dest: &SocketAddr) -> Option<u32> {
    let local = local_address_for(dest)?;
    let scope = match dest {
        SocketAddr::V6(v6) => v6.scope_id(),
        SocketAddr::V4(_) => 0,
    };
    index_from_address(&local, scope)
}

/// Map a local address back to the interface carrying it
pub fn index_from_address(addr: &IpAddr, scope_id: u32) -> Option<u32> {
    let addrs = getifaddrs().ok()?;
    for entry in addrs {
        let Some(storage) = entry.address else {
            continue;
        };
        let matched = match addr {
            IpAddr::V4(ip) => storage
                .as_sockaddr_in()
                .map(|sin| std::net::SocketAddrV4::from(*sin).ip() == ip)
                .unwrap_or(false),
            IpAddr::V6(ip) => storage
                .as_sockaddr_in6()
                .map(|sin6| {
                    let candidate = std::net::SocketAddrV6::from(*sin6);
                    let link_local = candidate.ip().segments()[0] & 0xffc0 == 0xfe80;
                    candidate.ip() == ip && !(link_local && candidate.scope_id() != scope_id)
                })
                .unwrap_or(false),
        };
        if matched {
            return interface_index(&entry.interface_name);
        }
    }
    None
}
