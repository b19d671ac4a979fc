//! Printable socket addresses with a reverse-lookup cache
//!
//! Reverse DNS can stall for seconds when there is no PTR record, so names
//! are cached most-recently-used first. The lock is not held during the
//! lookup; two threads resolving the same new address may both insert it,
//! which only costs a duplicate entry that ages out.

use std::collections::VecDeque;
use std::ffi::CStr;
use std::net::SocketAddr;
use std::sync::OnceLock;

use parking_lot::Mutex;
use socket2::SockAddr;

/// Entries kept before the least recently used is evicted
pub const CACHE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    addr: SocketAddr,
    full: bool,
    text: String,
}

/// MRU cache of formatted addresses
#[derive(Debug)]
pub struct FormatCache {
    entries: Mutex<VecDeque<Entry>>,
    capacity: usize,
}

impl FormatCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    /// Cached text for `addr`, moving the entry to the front on a hit
    pub fn get(&self, addr: &SocketAddr, full: bool) -> Option<String> {
        let mut entries = self.entries.lock();
        let pos = entries
            .iter()
            .position(|e| e.addr == *addr && e.full == full)?;
        let entry = entries.remove(pos)?;
        let text = entry.text.clone();
        entries.push_front(entry);
        Some(text)
    }

    pub fn insert(&self, addr: SocketAddr, full: bool, text: String) {
        let mut entries = self.entries.lock();
        entries.push_front(Entry { addr, full, text });
        entries.truncate(self.capacity);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Format `addr`, consulting the cache first and `resolve` on a miss
    pub fn format_with<F>(&self, addr: &SocketAddr, full: bool, resolve: F) -> String
    where
        F: FnOnce(&SocketAddr) -> Option<String>,
    {
        if let Some(text) = self.get(addr, full) {
            return text;
        }
        let numeric = addr.to_string();
        let text = if full && !addr.ip().is_unspecified() {
            match resolve(addr) {
                Some(name) if name != addr.ip().to_string() => {
                    format!("{}({}):{}", bracketed_ip(addr), name, addr.port())
                }
                _ => numeric,
            }
        } else {
            numeric
        };
        self.insert(*addr, full, text.clone());
        text
    }
}

fn bracketed_ip(addr: &SocketAddr) -> String {
    match addr {
        SocketAddr::V4(v4) => v4.ip().to_string(),
        SocketAddr::V6(v6) => format!("[{}]", v6.ip()),
    }
}

/// Host name for an address via the system resolver (getnameinfo)
pub fn reverse_lookup(addr: &SocketAddr) -> Option<String> {
    let sa = SockAddr::from(*addr);
    let mut host = [0 as libc::c_char; libc::NI_MAXHOST as usize];
    // SAFETY: sa is a valid sockaddr of sa.len() bytes and host is writable
    // for the length given
    let r = unsafe {
        libc::getnameinfo(
            sa.as_ptr(),
            sa.len(),
            host.as_mut_ptr(),
            host.len() as libc::socklen_t,
            std::ptr::null_mut(),
            0,
            libc::NI_NOFQDN | libc::NI_NAMEREQD,
        )
    };
    if r != 0 {
        return None;
    }
    // SAFETY: getnameinfo NUL-terminates on success
    let name = unsafe { CStr::from_ptr(host.as_ptr()) };
    Some(name.to_string_lossy().into_owned())
}

fn cache() -> &'static FormatCache {
    static CACHE: OnceLock<FormatCache> = OnceLock::new();
    CACHE.get_or_init(|| FormatCache::new(CACHE_CAPACITY))
}

/// Format an address as `ip:port`, or `ip(name):port` when `full` and a
/// reverse name exists. Results are cached process-wide.
pub fn formatsock(addr: &SocketAddr, full: bool) -> String {
    cache().format_with(addr, full, reverse_lookup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_numeric_format() {
        let addr: SocketAddr = "239.1.2.3:5006".parse().unwrap();
        assert_eq!(formatsock(&addr, false), "239.1.2.3:5006");
    }

    #[test]
    fn test_resolver_called_once_per_address() {
        let cache = FormatCache::new(4);
        let addr: SocketAddr = "192.0.2.7:5004".parse().unwrap();
        let calls = Cell::new(0);
        let resolve = |_: &SocketAddr| {
            calls.set(calls.get() + 1);
            Some("radio.example".to_string())
        };
        assert_eq!(cache.format_with(&addr, true, resolve), "192.0.2.7(radio.example):5004");
        assert_eq!(cache.format_with(&addr, true, resolve), "192.0.2.7(radio.example):5004");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_hit_promotes_and_lru_evicted() {
        let cache = FormatCache::new(2);
        let a: SocketAddr = "10.0.0.1:1".parse().unwrap();
        let b: SocketAddr = "10.0.0.2:1".parse().unwrap();
        let c: SocketAddr = "10.0.0.3:1".parse().unwrap();
        cache.format_with(&a, false, |_| None);
        cache.format_with(&b, false, |_| None);
        // a becomes most recent, so b is the one evicted by c
        assert!(cache.get(&a, false).is_some());
        cache.format_with(&c, false, |_| None);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&b, false).is_none());
        assert!(cache.get(&a, false).is_some());
        assert!(cache.get(&c, false).is_some());
    }

    #[test]
    fn test_unspecified_never_resolved() {
        let cache = FormatCache::new(2);
        let addr: SocketAddr = "0.0.0.0:80".parse().unwrap();
        let text = cache.format_with(&addr, true, |_| panic!("must not resolve 0.0.0.0"));
        assert_eq!(text, "0.0.0.0:80");
    }
}
