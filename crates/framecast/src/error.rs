// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types.
//!
//! Errors on the data path ([`ProtocolError`]) are never propagated out of the
//! receive loops: the offending datagram is dropped and the loop continues.
//! Only socket setup and registration can fail a caller.

use std::net::SocketAddr;
use thiserror::Error;

/// Datagram classification errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("{kind} datagram truncated: {len} bytes, header needs {needed}")]
    Truncated {
        kind: &'static str,
        len: usize,
        needed: usize,
    },

    #[error("unrecognized datagram prefix")]
    Unrecognized,
}

/// Packetizer errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketizeError {
    #[error("payload of {0} bytes exceeds the u32 frame size field")]
    PayloadTooLarge(usize),
}

/// Payload source errors.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source will never produce another payload.
    #[error("payload source exhausted")]
    Exhausted,

    #[error("payload source I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("payload source error: {0}")]
    Other(String),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Transport (server/client) errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No REGISTERED reply from {0} before timeout")]
    RegistrationTimeout(SocketAddr),

    #[error("Already running")]
    AlreadyRunning,
}
