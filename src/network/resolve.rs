//! Multicast target resolution
//!
//! Targets are written `name[:port][,iface]`. A bare name without a dot is
//! looked up as `name.local` so multicast DNS can answer it.

use std::ffi::{CStr, CString};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::ptr;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::NetworkError;

/// Resolution is only reported once it has been failing this long
const SLOW_RESOLVE: Duration = Duration::from_secs(2);

/// Pause between failed lookups so a fast NXDOMAIN does not spin
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// A parsed `name[:port][,iface]` target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McastTarget {
    pub host: String,
    pub port: Option<u16>,
    pub iface: Option<String>,
}

impl McastTarget {
    /// Split a target string. The interface is after the last comma and the
    /// port after the last colon of what remains.
    pub fn parse(target: &str) -> Result<Self, NetworkError> {
        let bad = |reason: &str| NetworkError::ResolveFailed {
            target: target.to_string(),
            reason: reason.to_string(),
        };

        let (rest, iface) = match target.rsplit_once(',') {
            Some((rest, iface)) => (rest, Some(iface.to_string()).filter(|s| !s.is_empty())),
            None => (target, None),
        };
        let (host, port) = match rest.strip_prefix('[') {
            // [v6 literal][:port]
            Some(bracketed) => {
                let (host, tail) = bracketed.split_once(']').ok_or_else(|| bad("unclosed '['"))?;
                let port = match tail.strip_prefix(':') {
                    Some(p) => Some(p.parse::<u16>().map_err(|_| bad("invalid port"))?),
                    None if tail.is_empty() => None,
                    None => return Err(bad("junk after ']'")),
                };
                (host, port)
            }
            None => match rest.rsplit_once(':') {
                Some((host, port)) => {
                    let port = port.parse::<u16>().map_err(|_| bad("invalid port"))?;
                    (host, Some(port))
                }
                None => (rest, None),
            },
        };
        if host.is_empty() {
            return Err(bad("empty host name"));
        }
        Ok(Self {
            host: host.to_string(),
            port,
            iface,
        })
    }

    /// Host name as it is handed to the resolver
    pub fn qualified_host(&self) -> String {
        if self.host.contains('.') {
            self.host.clone()
        } else {
            format!("{}.local", self.host)
        }
    }
}

/// Resolve a multicast target.
///
/// `tries` bounds the number of lookups, 0 meaning forever. The first
/// lookup asks for IPv4 only; asking for both families makes the resolver
/// wait out AAAA retransmissions even after the A answer arrives. When the
/// target has no port, `default_port` is used.
///
/// Returns the address and the interface named in the target, if any.
pub fn resolve_mcast(
    target: &str,
    default_port: u16,
    tries: u32,
) -> Result<(SocketAddr, Option<String>), NetworkError> {
    let parsed = McastTarget::parse(target)?;
    let port = parsed.port.unwrap_or(default_port);
    if let Ok(ip) = parsed.host.parse::<IpAddr>() {
        return Ok((SocketAddr::new(ip, port), parsed.iface));
    }
    let host = parsed.qualified_host();
    let c_host = CString::new(host.clone()).map_err(|_| NetworkError::ResolveFailed {
        target: target.to_string(),
        reason: "host name contains NUL".to_string(),
    })?;

    let start = Instant::now();
    let mut reported = false;
    let mut attempt: u32 = 0;
    let mut last_error = String::new();

    while tries == 0 || attempt < tries {
        let family = if attempt == 0 { libc::AF_INET } else { libc::AF_UNSPEC };
        match getaddrinfo_first(&c_host, family) {
            Ok(mut addr) => {
                if reported {
                    info!(host = %host, "resolved after retrying");
                }
                addr.set_port(port);
                return Ok((addr, parsed.iface));
            }
            Err(e) => {
                if !reported && start.elapsed() > SLOW_RESOLVE {
                    warn!(host = %host, error = %e, "still resolving, retrying");
                    reported = true;
                }
                last_error = e;
            }
        }
        attempt += 1;
        if tries == 0 || attempt < tries {
            thread::sleep(RETRY_DELAY);
        }
    }

    Err(NetworkError::ResolveFailed {
        target: target.to_string(),
        reason: last_error,
    })
}

/// First UDP address for `host` in the requested family
fn getaddrinfo_first(host: &CStr, family: libc::c_int) -> Result<SocketAddr, String> {
    // SAFETY: an all-zero addrinfo is a valid hints value
    let mut hints: libc::addrinfo = unsafe { std::mem::zeroed() };
    hints.ai_family = family;
    hints.ai_socktype = libc::SOCK_DGRAM;
    hints.ai_protocol = libc::IPPROTO_UDP;
    hints.ai_flags = libc::AI_ADDRCONFIG;

    let mut results: *mut libc::addrinfo = ptr::null_mut();
    // SAFETY: host is NUL-terminated, hints outlives the call and results is
    // only read after a successful return
    let code = unsafe { libc::getaddrinfo(host.as_ptr(), ptr::null(), &hints, &mut results) };
    if code != 0 {
        // SAFETY: gai_strerror returns a static string for any code
        let reason = unsafe { CStr::from_ptr(libc::gai_strerror(code)) };
        return Err(reason.to_string_lossy().into_owned());
    }

    let mut found = None;
    let mut cursor = results;
    while !cursor.is_null() && found.is_none() {
        // SAFETY: cursor walks the list getaddrinfo returned
        let ai = unsafe { &*cursor };
        found = unsafe { sockaddr_to_std(ai.ai_addr) };
        cursor = ai.ai_next;
    }
    // SAFETY: results came from a successful getaddrinfo
    unsafe { libc::freeaddrinfo(results) };
    found.ok_or_else(|| "no usable address".to_string())
}

/// Convert a C socket address of family AF_INET or AF_INET6.
///
/// # Safety
/// `sa` must be null or point to a sockaddr of the size its family implies.
pub(crate) unsafe fn sockaddr_to_std(sa: *const libc::sockaddr) -> Option<SocketAddr> {
    if sa.is_null() {
        return None;
    }
    match (*sa).sa_family as libc::c_int {
        libc::AF_INET => {
            let sin = &*(sa as *const libc::sockaddr_in);
            let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
            Some(SocketAddr::V4(SocketAddrV4::new(ip, u16::from_be(sin.sin_port))))
        }
        libc::AF_INET6 => {
            let sin6 = &*(sa as *const libc::sockaddr_in6);
            Some(SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(sin6.sin6_addr.s6_addr),
                u16::from_be(sin6.sin6_port),
                sin6.sin6_flowinfo,
                sin6.sin6_scope_id,
            )))
        }
        _ => None,
    }
}
