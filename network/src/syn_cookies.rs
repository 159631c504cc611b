//! Per-endpoint handshake cookies.
//!
//! A connecting peer is challenged with a random cookie it must sign with
//! its node key. Cookies expire, validation consumes them, and each IP has
//! a bounded number outstanding so the table cannot be flooded.

use lattica_crypto::verify_message;
use lattica_types::{PublicKey, Signature};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Cookies expire after this long.
const COOKIE_TTL: Duration = Duration::from_secs(30);

/// Outstanding cookies allowed per IP.
const MAX_COOKIES_PER_IP: usize = 10;

struct CookieEntry {
    cookie: [u8; 32],
    created_at: Instant,
}

struct Inner {
    cookies: HashMap<SocketAddr, CookieEntry>,
    per_ip: HashMap<IpAddr, usize>,
}

pub struct SynCookies {
    inner: Mutex<Inner>,
    max_entries: usize,
}

impl SynCookies {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                cookies: HashMap::new(),
                per_ip: HashMap::new(),
            }),
            max_entries,
        }
    }

    /// Issue a cookie for `endpoint`, or `None` when the endpoint already
    /// has one outstanding, its IP is over quota, or the table is full.
    pub fn assign(&self, endpoint: SocketAddr) -> Option<[u8; 32]> {
        let mut inner = self.inner.lock().unwrap();
        if inner.cookies.len() >= self.max_entries {
            Self::purge_expired_locked(&mut inner);
            if inner.cookies.len() >= self.max_entries {
                return None;
            }
        }
        if inner.cookies.contains_key(&endpoint) {
            return None;
        }
        let ip_count = inner.per_ip.entry(endpoint.ip()).or_insert(0);
        if *ip_count >= MAX_COOKIES_PER_IP {
            return None;
        }
        *ip_count += 1;

        let mut cookie = [0u8; 32];
        if getrandom::getrandom(&mut cookie).is_err() {
            return None;
        }
        inner.cookies.insert(
            endpoint,
            CookieEntry {
                cookie,
                created_at: Instant::now(),
            },
        );
        Some(cookie)
    }

    /// Validate a handshake response. Consumes the cookie either way, so a
    /// failed attempt cannot be retried against the same challenge.
    pub fn validate(
        &self,
        endpoint: SocketAddr,
        node_id: &PublicKey,
        signature: &Signature,
    ) -> bool {
        let entry = {
            let mut inner = self.inner.lock().unwrap();
            let entry = inner.cookies.remove(&endpoint);
            if entry.is_some() {
                Self::decrement_ip(&mut inner, endpoint.ip());
            }
            entry
        };
        let Some(entry) = entry else {
            return false;
        };
        if entry.created_at.elapsed() > COOKIE_TTL {
            return false;
        }
        verify_message(&entry.cookie, signature, node_id)
    }

    /// Drop expired entries; called on a timer cadence.
    pub fn purge_expired(&self) {
        let mut inner = self.inner.lock().unwrap();
        Self::purge_expired_locked(&mut inner);
    }

    fn purge_expired_locked(inner: &mut Inner) {
        let expired: Vec<SocketAddr> = inner
            .cookies
            .iter()
            .filter(|(_, entry)| entry.created_at.elapsed() > COOKIE_TTL)
            .map(|(endpoint, _)| *endpoint)
            .collect();
        for endpoint in expired {
            inner.cookies.remove(&endpoint);
            Self::decrement_ip(inner, endpoint.ip());
        }
    }

    fn decrement_ip(inner: &mut Inner, ip: IpAddr) {
        if let Some(count) = inner.per_ip.get_mut(&ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                inner.per_ip.remove(&ip);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
