// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client session registry (sender side).
//!
//! A session is created by `REGISTER_CLIENT` and keyed by the exact source
//! `(ip, port)` of that datagram: frames go back to that endpoint so they
//! follow the NAT mapping the client opened.
//!
//! `KEEPALIVE` and `DISCONNECT` may leave the client from another ephemeral
//! port, so they are matched by IP only through a secondary index. When several
//! sessions share an IP, the index points at the earliest registered one and
//! only that session is refreshed or removed.
//!
//! All operations take the table lock for their whole duration. Time is passed
//! in explicitly.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::protocol::REGISTERED;

/// A registered receiving endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSession {
    /// Send target, recorded verbatim at registration.
    pub endpoint: SocketAddr,
    /// Last registration or keepalive.
    pub last_seen: Instant,
    /// Registration order, used to keep "first match by IP" stable.
    registration_seq: u64,
}

impl ClientSession {
    /// Whether the session has been idle for longer than `timeout`.
    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > timeout
    }
}

/// Reply to a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterAck {
    /// Where the acknowledgment must be sent.
    pub endpoint: SocketAddr,
    /// `false` when an existing session was only refreshed.
    pub new_session: bool,
}

impl RegisterAck {
    /// Acknowledgment datagram.
    pub fn payload(&self) -> &'static [u8] {
        REGISTERED
    }
}

#[derive(Debug, Default)]
struct SessionTable {
    sessions: HashMap<SocketAddr, ClientSession>,
    by_ip: HashMap<IpAddr, SocketAddr>,
    next_seq: u64,
}

impl SessionTable {
    fn remove(&mut self, endpoint: &SocketAddr) -> Option<ClientSession> {
        let removed = self.sessions.remove(endpoint)?;
        let ip = endpoint.ip();
        log::trace!("[registry] session {} removed", endpoint);

        if self.by_ip.get(&ip) == Some(endpoint) {
            // Re-point to the oldest remaining session from the same IP
            let next = self
                .sessions
                .values()
                .filter(|s| s.endpoint.ip() == ip)
                .min_by_key(|s| s.registration_seq)
                .map(|s| s.endpoint);
            match next {
                Some(addr) => {
                    self.by_ip.insert(ip, addr);
                }
                None => {
                    self.by_ip.remove(&ip);
                }
            }
        }

        Some(removed)
    }
}

/// Thread-safe table of client sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    table: Mutex<SessionTable>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `endpoint` as a send target, or refresh it if already known.
    pub fn register(&self, endpoint: SocketAddr, now: Instant) -> RegisterAck {
        let mut table = self.table.lock();

        if let Some(session) = table.sessions.get_mut(&endpoint) {
            session.last_seen = now;
            return RegisterAck {
                endpoint,
                new_session: false,
            };
        }

        let registration_seq = table.next_seq;
        table.next_seq += 1;
        table.sessions.insert(
            endpoint,
            ClientSession {
                endpoint,
                last_seen: now,
                registration_seq,
            },
        );
        table.by_ip.entry(endpoint.ip()).or_insert(endpoint);
        log::trace!(
            "[registry] session {} added ({} total)",
            endpoint,
            table.sessions.len()
        );

        RegisterAck {
            endpoint,
            new_session: true,
        }
    }

    /// Refresh the session registered from `ip`.
    ///
    /// Returns the refreshed endpoint, or `None` when no session matches.
    pub fn keepalive(&self, ip: IpAddr, now: Instant) -> Option<SocketAddr> {
        let mut table = self.table.lock();
        let endpoint = *table.by_ip.get(&ip)?;
        let session = table.sessions.get_mut(&endpoint)?;
        session.last_seen = now;
        Some(endpoint)
    }

    /// Remove the session registered from `ip`.
    pub fn disconnect(&self, ip: IpAddr) -> Option<ClientSession> {
        let mut table = self.table.lock();
        let endpoint = *table.by_ip.get(&ip)?;
        table.remove(&endpoint)
    }

    /// Remove every session idle for longer than `timeout`.
    ///
    /// Returns the removed endpoints.
    pub fn sweep(&self, now: Instant, timeout: Duration) -> Vec<SocketAddr> {
        let mut table = self.table.lock();
        let expired: Vec<SocketAddr> = table
            .sessions
            .values()
            .filter(|s| s.is_expired(now, timeout))
            .map(|s| s.endpoint)
            .collect();

        for endpoint in &expired {
            table.remove(endpoint);
        }

        expired
    }

    /// Remove the given endpoints, ignoring any already gone.
    ///
    /// Returns how many were actually removed.
    pub fn remove_endpoints(&self, endpoints: &[SocketAddr]) -> usize {
        let mut table = self.table.lock();
        endpoints
            .iter()
            .filter(|e| table.remove(e).is_some())
            .count()
    }

    /// Snapshot of the current send targets.
    pub fn endpoints(&self) -> Vec<SocketAddr> {
        self.table.lock().sessions.keys().copied().collect()
    }

    /// Look up a session by its exact endpoint.
    pub fn get(&self, endpoint: &SocketAddr) -> Option<ClientSession> {
        self.table.lock().sessions.get(endpoint).cloned()
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.table.lock().sessions.len()
    }

    /// Whether no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.table.lock().sessions.is_empty()
    }
}
