//! DNS resolution cache (spec.md §4.8 `connect`, ported from
//! `net/dns_cache.h`/`.cpp`).
//!
//! A process-wide cache of host -> resolved address, keyed by the
//! literal host string and expired by a per-call TTL rather than a
//! fixed one. Resolution itself is synchronous (`getaddrinfo` via
//! `std::net::ToSocketAddrs`) since this crate has no async DNS
//! dependency in its stack; callers needing non-blocking resolution
//! should run `resolve` on a [`crate::worker::Worker`].

use crate::util::current_seconds;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, OnceLock};

struct Entry {
    addr: SocketAddr,
    created_secs: u64,
}

pub struct DnsCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl DnsCache {
    fn new() -> Self {
        DnsCache {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn global() -> &'static DnsCache {
        static INSTANCE: OnceLock<DnsCache> = OnceLock::new();
        INSTANCE.get_or_init(DnsCache::new)
    }

    /// Resolves `host:port`, preferring a cache hit younger than
    /// `ttl_secs`. Falls back to system resolution on a miss or an
    /// expired entry, caching the first address returned.
    pub fn resolve(&self, host: &str, port: u16, ttl_secs: u64) -> std::io::Result<SocketAddr> {
        if let Some(addr) = self.cached(host, ttl_secs) {
            return Ok(addr);
        }

        use std::net::ToSocketAddrs;
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses returned"))?;

        self.entries.lock().unwrap().insert(
            host.to_string(),
            Entry {
                addr,
                created_secs: current_seconds(),
            },
        );
        Ok(addr)
    }

    fn cached(&self, host: &str, ttl_secs: u64) -> Option<SocketAddr> {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get(host) else {
            return None;
        };
        if entry.created_secs + ttl_secs < current_seconds() {
            entries.remove(host);
            return None;
        }
        Some(entry.addr)
    }

    pub fn evict(&self, host: &str) {
        self.entries.lock().unwrap().remove(host);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_localhost() {
        let cache = DnsCache::new();
        let addr = cache.resolve("localhost", 9, 60).unwrap();
        assert_eq!(addr.port(), 9);
    }

    #[test]
    fn second_lookup_within_ttl_is_served_from_cache() {
        let cache = DnsCache::new();
        let first = cache.resolve("localhost", 80, 60).unwrap();
        let second = cache.resolve("localhost", 80, 60).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn expired_entry_is_evicted_and_relooked_up() {
        let cache = DnsCache::new();
        let _ = cache.resolve("localhost", 80, 0).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert!(cache.cached("localhost", 0).is_none());
    }
}
