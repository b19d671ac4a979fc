//! Multicast transport to and from the radio daemon
//!
//! The daemon publishes status, audio and spectrum on multicast groups and
//! takes commands on its status group. This module resolves group names,
//! opens joined sockets and formats peer addresses for logs.

pub mod formatsock;
pub mod iface;
pub mod multicast;
pub mod resolve;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

pub use formatsock::formatsock;
pub use multicast::{connect_mcast, join_group, listen_mcast, output_mcast, setup_mcast};
pub use resolve::{resolve_mcast, McastTarget};

/// Default port of the daemon's status/command group
pub const DEFAULT_STAT_PORT: u16 = 5006;

/// Default port of RTP data groups
pub const DEFAULT_RTP_PORT: u16 = 5004;

/// True if both addresses have the same IP, ignoring ports
pub fn address_match(a: &SocketAddr, b: &SocketAddr) -> bool {
    a.ip() == b.ip()
}

pub fn get_port(addr: &SocketAddr) -> u16 {
    addr.port()
}

pub fn set_port(addr: &mut SocketAddr, port: u16) {
    addr.set_port(port);
}

pub fn is_multicast(addr: &SocketAddr) -> bool {
    addr.ip().is_multicast()
}

/// FNV-1 32-bit hash
fn fnv1_hash(data: &[u8]) -> u32 {
    data.iter().fold(0x811c_9dc5u32, |hash, &b| {
        hash.wrapping_mul(0x0100_0193) ^ b as u32
    })
}

/// Derive an administratively scoped (239/8) group address from a name.
///
/// 239.0.0.0/24 and 239.128.0.0/24 map onto the same Ethernet MAC addresses
/// as the unsnooped 224.0.0.0/24 control block, so they are avoided.
pub fn make_maddr(name: &str) -> Ipv4Addr {
    let mut addr = (239u32 << 24) | (fnv1_hash(name.as_bytes()) & 0x00ff_ffff);
    if addr & 0x007f_ff00 == 0 {
        addr |= (addr & 0xff) << 8;
    }
    if addr & 0x007f_ff00 == 0 {
        addr |= 0x0010_0000;
    }
    Ipv4Addr::from(addr)
}

/// Unspecified address of the same family, for binding helper sockets
pub(crate) fn unspecified_like(addr: &SocketAddr) -> SocketAddr {
    match addr {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED), 0),
    }
}
