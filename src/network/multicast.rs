//! Multicast socket setup
//!
//! Every socket also subscribes to its group on loopback. Switches doing
//! IGMP snooping treat groups nobody has joined as unregistered and may
//! flood them everywhere; joining our own groups keeps them registered.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use socket2::{Domain, InterfaceIndexOrAddress, Protocol, SockAddr, Socket, Type};
use tracing::{debug, warn};

use super::iface::{interface_for_destination, interface_index, local_address_for, loopback};
use super::resolve::resolve_mcast;
use super::{formatsock, is_multicast, DEFAULT_RTP_PORT};
use crate::error::NetworkError;

/// Receive sockets block at most this long so their loops can see shutdown
pub const RECV_TIMEOUT: Duration = Duration::from_millis(500);

/// Join `sock` to `group`.
///
/// With a `source`, a source-specific join is made on whichever interface
/// routes to that source; `iface` is then only a hint for IPv6. Without a
/// source, the join uses `iface`, else the interface routing to the group,
/// else loopback. Joining a group twice is not an error.
pub fn join_group(
    sock: &Socket,
    source: Option<&SocketAddr>,
    group: &SocketAddr,
    iface: Option<&str>,
) -> Result<(), NetworkError> {
    if !is_multicast(group) {
        return Err(NetworkError::NotMulticast(group.to_string()));
    }
    if let Some(source) = source {
        return ssm_join_group(sock, source, group, iface);
    }

    let index = match iface {
        Some(name) => interface_index(name),
        None => interface_for_destination(group),
    };
    let index = match index {
        Some(index) => index,
        None => loopback()?.index,
    };

    let result = match group.ip() {
        IpAddr::V4(ip) => sock.join_multicast_v4_n(&ip, &InterfaceIndexOrAddress::Index(index)),
        IpAddr::V6(ip) => sock.join_multicast_v6(&ip, index),
    };
    match result {
        Err(e) if e.kind() != io::ErrorKind::AddrInUse => Err(NetworkError::JoinFailed(format!(
            "{} on {}: {}",
            formatsock(group, false),
            iface.unwrap_or("default"),
            e
        ))),
        _ => Ok(()),
    }
}

fn ssm_join_group(
    sock: &Socket,
    source: &SocketAddr,
    group: &SocketAddr,
    iface: Option<&str>,
) -> Result<(), NetworkError> {
    match (source.ip(), group.ip()) {
        (IpAddr::V4(source_ip), IpAddr::V4(group_ip)) => {
            let Some(IpAddr::V4(local)) = local_address_for(source) else {
                return Err(NetworkError::JoinFailed(format!(
                    "no local interface reaches {}",
                    formatsock(source, false)
                )));
            };
            // a repeated source join reports EADDRNOTAVAIL
            match sock.join_ssm_v4(&source_ip, &group_ip, &local) {
                Err(e)
                    if !matches!(
                        e.kind(),
                        io::ErrorKind::AddrInUse | io::ErrorKind::AddrNotAvailable
                    ) =>
                {
                    Err(NetworkError::JoinFailed(format!(
                        "{} from {} via {}: {}",
                        formatsock(group, false),
                        formatsock(source, false),
                        local,
                        e
                    )))
                }
                _ => Ok(()),
            }
        }
        (IpAddr::V6(_), IpAddr::V6(_)) => {
            let index = match iface {
                Some(name) => interface_index(name),
                None => interface_for_destination(source),
            };
            let index = match index {
                Some(index) => index,
                None => loopback()?.index,
            };
            join_source_group_v6(sock, source, group, index).map_err(|e| {
                NetworkError::JoinFailed(format!(
                    "{} from {} on {}: {}",
                    formatsock(group, false),
                    formatsock(source, false),
                    iface.unwrap_or("default"),
                    e
                ))
            })
        }
        _ => Err(NetworkError::UnsupportedFamily),
    }
}

/// Copy a socket address into a zeroed sockaddr_storage
#[cfg(target_os = "linux")]
fn to_storage(addr: &SocketAddr) -> libc::sockaddr_storage {
    let sa = SockAddr::from(*addr);
    // SAFETY: sockaddr_storage is plain data and large enough for any family
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    // SAFETY: sa.len() bytes are valid at sa.as_ptr() and fit in storage
    unsafe {
        std::ptr::copy_nonoverlapping(
            sa.as_ptr() as *const u8,
            &mut storage as *mut libc::sockaddr_storage as *mut u8,
            sa.len() as usize,
        );
    }
    storage
}

#[cfg(target_os = "linux")]
fn join_source_group_v6(
    sock: &Socket,
    source: &SocketAddr,
    group: &SocketAddr,
    index: u32,
) -> io::Result<()> {
    const MCAST_JOIN_SOURCE_GROUP: libc::c_int = 46;

    #[repr(C)]
    struct GroupSourceReq {
        gsr_interface: u32,
        gsr_group: libc::sockaddr_storage,
        gsr_source: libc::sockaddr_storage,
    }

    let req = GroupSourceReq {
        gsr_interface: index,
        gsr_group: to_storage(group),
        gsr_source: to_storage(source),
    };
    setsockopt(sock, libc::IPPROTO_IPV6, MCAST_JOIN_SOURCE_GROUP, &req)
}

#[cfg(not(target_os = "linux"))]
fn join_source_group_v6(
    _sock: &Socket,
    _source: &SocketAddr,
    _group: &SocketAddr,
    _index: u32,
) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "IPv6 source-specific join is only implemented on Linux",
    ))
}

fn setsockopt<T>(sock: &Socket, level: libc::c_int, name: libc::c_int, value: &T) -> io::Result<()> {
    use std::os::fd::AsRawFd;
    // SAFETY: value points to a live T of exactly the size passed
    let r = unsafe {
        libc::setsockopt(
            sock.as_raw_fd(),
            level,
            name,
            value as *const T as *const libc::c_void,
            std::mem::size_of::<T>() as libc::socklen_t,
        )
    };
    if r < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Direct IPv4 multicast output to an interface index
#[cfg(target_os = "linux")]
fn set_multicast_if_v4(sock: &Socket, index: u32, local: Ipv4Addr) -> io::Result<()> {
    let mreqn = libc::ip_mreqn {
        imr_multiaddr: libc::in_addr { s_addr: 0 },
        imr_address: libc::in_addr {
            s_addr: u32::from(local).to_be(),
        },
        imr_ifindex: index as libc::c_int,
    };
    setsockopt(sock, libc::IPPROTO_IP, libc::IP_MULTICAST_IF, &mreqn)
}

#[cfg(not(target_os = "linux"))]
fn set_multicast_if_v4(sock: &Socket, _index: u32, local: Ipv4Addr) -> io::Result<()> {
    sock.set_multicast_if_v4(&local)
}

/// Direct multicast output for `group`'s family to an interface
fn set_multicast_if(sock: &Socket, group: &SocketAddr, index: u32, local: Ipv4Addr) -> io::Result<()> {
    match group {
        SocketAddr::V4(_) => set_multicast_if_v4(sock, index, local),
        SocketAddr::V6(_) => sock.set_multicast_if_v6(index),
    }
}

fn new_udp_socket(group: &SocketAddr) -> Result<Socket, NetworkError> {
    Socket::new(Domain::for_address(*group), Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| NetworkError::BindFailed(format!("socket(): {}", e)))
}

/// Open an unconnected multicast send socket.
///
/// The socket never blocks; a full send buffer drops the packet. TTL,
/// multicast loop and TOS are best effort. A `ttl` of 0 or less keeps all
/// traffic on loopback and ignores `iface`. A negative `tos` is not set.
pub fn output_mcast(
    group: &SocketAddr,
    iface: Option<&str>,
    ttl: i32,
    tos: i32,
) -> Result<Socket, NetworkError> {
    let sock = new_udp_socket(group)?;
    sock.set_nonblocking(true)?;

    if ttl >= 0 {
        let r = match group {
            SocketAddr::V4(_) => sock.set_multicast_ttl_v4(ttl as u32),
            SocketAddr::V6(_) => sock.set_multicast_hops_v6(ttl as u32),
        };
        if let Err(e) = r {
            warn!(ttl, error = %e, "setting multicast ttl failed");
        }
    }
    let r = match group {
        SocketAddr::V4(_) => sock.set_multicast_loop_v4(true),
        SocketAddr::V6(_) => sock.set_multicast_loop_v6(true),
    };
    if let Err(e) = r {
        warn!(error = %e, "enabling multicast loop failed");
    }
    if tos >= 0 {
        let r = match group {
            SocketAddr::V4(_) => sock.set_tos(tos as u32),
            SocketAddr::V6(_) => setsockopt(&sock, libc::IPPROTO_IPV6, libc::IPV6_TCLASS, &tos),
        };
        if let Err(e) = r {
            warn!(tos, error = %e, "setting tos failed");
        }
    }

    let iface = iface.filter(|name| !name.is_empty());
    if ttl <= 0 {
        if let Some(name) = iface {
            warn!(iface = name, "ttl is 0, interface ignored");
        }
        let lo = loopback()?;
        if let Err(e) = join_group(&sock, None, group, Some(&lo.name)) {
            debug!(error = %e, "loopback join on output socket failed");
        }
        set_multicast_if(&sock, group, lo.index, Ipv4Addr::LOCALHOST).map_err(|e| {
            NetworkError::JoinFailed(format!("multicast output to {}: {}", lo.name, e))
        })?;
    } else if let Some(name) = iface {
        if let Err(e) = join_group(&sock, None, group, Some(name)) {
            warn!(iface = name, error = %e, "join on output interface failed");
        }
        let index = match interface_index(name) {
            Some(index) => index,
            None => loopback()?.index,
        };
        set_multicast_if(&sock, group, index, Ipv4Addr::UNSPECIFIED).map_err(|e| {
            NetworkError::JoinFailed(format!("multicast output to {}: {}", name, e))
        })?;
    } else if let Err(e) = join_group(&sock, None, group, None) {
        warn!(error = %e, "join on default interface failed");
    }
    Ok(sock)
}

/// Like [`output_mcast`], then connect to the group so plain `send` works
pub fn connect_mcast(
    group: &SocketAddr,
    iface: Option<&str>,
    ttl: i32,
    tos: i32,
) -> Result<UdpSocket, NetworkError> {
    let sock = output_mcast(group, iface, ttl, tos)?;
    sock.connect(&SockAddr::from(*group)).map_err(|e| {
        NetworkError::BindFailed(format!(
            "connect to {} (iface {}, ttl {}, tos {}): {}",
            formatsock(group, false),
            iface.unwrap_or("default"),
            ttl,
            tos,
            e
        ))
    })?;
    Ok(sock.into())
}

/// Open a receive socket bound to `group`.
///
/// Joins on `iface` (or source-specifically when `source` is given). Any-source
/// sockets also join on loopback. Reads time out after [`RECV_TIMEOUT`].
pub fn listen_mcast(
    source: Option<&SocketAddr>,
    group: &SocketAddr,
    iface: Option<&str>,
) -> Result<UdpSocket, NetworkError> {
    let sock = new_udp_socket(group)?;
    let iface = iface.filter(|name| !name.is_empty());

    if let Err(e) = join_group(&sock, source, group, iface) {
        warn!(error = %e, "multicast join failed");
    }
    if source.is_none() {
        let lo = loopback()?;
        if let Err(e) = join_group(&sock, None, group, Some(&lo.name)) {
            debug!(error = %e, "loopback join failed");
        }
    }

    if let Err(e) = sock.set_reuse_port(true) {
        warn!(error = %e, "SO_REUSEPORT failed");
    }
    if let Err(e) = sock.set_reuse_address(true) {
        warn!(error = %e, "SO_REUSEADDR failed");
    }
    #[cfg(target_os = "linux")]
    if let Err(e) = sock.set_freebind(true) {
        warn!(error = %e, "IP_FREEBIND failed");
    }

    sock.bind(&SockAddr::from(*group)).map_err(|e| {
        NetworkError::BindFailed(format!("bind to {}: {}", formatsock(group, false), e))
    })?;
    sock.set_read_timeout(Some(RECV_TIMEOUT))?;
    Ok(sock.into())
}

/// Resolve `group` (and `source`, for source-specific input) and open it.
///
/// `output` selects a connected send socket, otherwise a bound receive
/// socket. `offset` is added to the default port when the target has none.
/// Returns the socket and the resolved group address.
pub fn setup_mcast(
    source: Option<&str>,
    group: &str,
    output: bool,
    ttl: i32,
    tos: i32,
    offset: u16,
    tries: u32,
) -> Result<(UdpSocket, SocketAddr), NetworkError> {
    let (group_addr, iface) = resolve_mcast(group, DEFAULT_RTP_PORT + offset, tries)?;
    let sock = if output {
        connect_mcast(&group_addr, iface.as_deref(), ttl, tos)?
    } else {
        let source_addr = match source {
            Some(source) => Some(resolve_mcast(source, 0, 2)?.0),
            None => None,
        };
        listen_mcast(source_addr.as_ref(), &group_addr, iface.as_deref())?
    };
    Ok((sock, group_addr))
}
