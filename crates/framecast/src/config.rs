// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server and client configuration.
//!
//! Both load from JSON; every field has a default so a partial file is valid.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::protocol::{DEFAULT_CHUNK_PAYLOAD_SIZE, MAX_DATAGRAM_SIZE};
use crate::reassembler::ReassemblerConfig;

/// Largest chunk payload that still fits one datagram with its header.
const MAX_CHUNK_PAYLOAD_SIZE: usize = MAX_DATAGRAM_SIZE - crate::protocol::CHUNK_HEADER_LEN;

// ============================================================================
// Server
// ============================================================================

/// Streaming server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// UDP port for registration and streaming (default: 9999)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Frame width in pixels, for sources that generate frames
    #[serde(default = "default_width")]
    pub width: u32,

    /// Frame height in pixels
    #[serde(default = "default_height")]
    pub height: u32,

    /// Target frame rate; the streamer sleeps 1/fps between frames
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Bytes of frame payload per chunk (0 = default 1200)
    #[serde(default = "default_chunk_payload_size")]
    pub chunk_payload_size: usize,

    /// Drop clients silent for longer than this (seconds)
    #[serde(default = "default_client_timeout")]
    pub client_timeout_secs: u64,

    /// Interval between inactive-client sweeps (seconds)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Receive timeout of the listener loop (milliseconds)
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_ms: u64,

    /// Sleep while no client is registered (milliseconds)
    #[serde(default = "default_idle_interval")]
    pub idle_interval_ms: u64,

    /// Interval between status log lines (seconds, 0 = off)
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,

    /// SO_RCVBUF override (bytes)
    #[serde(default)]
    pub recv_buffer_size: Option<usize>,
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    9999
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

fn default_fps() -> u32 {
    30
}

fn default_chunk_payload_size() -> usize {
    DEFAULT_CHUNK_PAYLOAD_SIZE
}

fn default_client_timeout() -> u64 {
    30
}

fn default_sweep_interval() -> u64 {
    5
}

fn default_poll_timeout() -> u64 {
    1000
}

fn default_idle_interval() -> u64 {
    100
}

fn default_status_interval() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            chunk_payload_size: default_chunk_payload_size(),
            client_timeout_secs: default_client_timeout(),
            sweep_interval_secs: default_sweep_interval(),
            poll_timeout_ms: default_poll_timeout(),
            idle_interval_ms: default_idle_interval(),
            status_interval_secs: default_status_interval(),
            recv_buffer_size: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load from `path` if it exists, defaults otherwise.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            log::debug!("[config] {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 || self.fps == 0 {
            return Err(ConfigError::Invalid(
                "width, height, and fps must be positive integers".into(),
            ));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port cannot be 0".into()));
        }
        if self.chunk_payload_size > MAX_CHUNK_PAYLOAD_SIZE {
            return Err(ConfigError::Invalid(format!(
                "chunk_payload_size {} exceeds {}",
                self.chunk_payload_size, MAX_CHUNK_PAYLOAD_SIZE
            )));
        }
        if self.client_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "client_timeout_secs cannot be 0".into(),
            ));
        }
        Ok(())
    }

    /// Socket address the server binds.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Pause between frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.fps.max(1)))
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    /// `None` when status logging is off.
    pub fn status_interval(&self) -> Option<Duration> {
        (self.status_interval_secs > 0).then(|| Duration::from_secs(self.status_interval_secs))
    }
}

// ============================================================================
// Client
// ============================================================================

/// Receiving client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server address to register with
    pub server: SocketAddr,

    /// Local bind address (default: unspecified, ephemeral port)
    #[serde(default)]
    pub bind: Option<SocketAddr>,

    /// Chunk payload size the server uses (0 = default 1200)
    #[serde(default = "default_chunk_payload_size")]
    pub chunk_payload_size: usize,

    /// Incomplete frames kept before the smallest id is evicted
    #[serde(default = "default_max_pending_frames")]
    pub max_pending_frames: usize,

    /// Largest frame accepted (bytes)
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    /// KEEPALIVE period (seconds)
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_secs: u64,

    /// How long to wait for REGISTERED (seconds)
    #[serde(default = "default_register_timeout")]
    pub register_timeout_secs: u64,

    /// Receive timeout of the client loop (milliseconds)
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_ms: u64,

    /// SO_RCVBUF override (bytes)
    #[serde(default)]
    pub recv_buffer_size: Option<usize>,
}

fn default_max_pending_frames() -> usize {
    5
}

fn default_max_frame_size() -> usize {
    64 * 1024 * 1024 // 64 MB
}

fn default_keepalive_interval() -> u64 {
    15
}

fn default_register_timeout() -> u64 {
    5
}

impl ClientConfig {
    /// Defaults for everything but the server address.
    pub fn new(server: SocketAddr) -> Self {
        Self {
            server,
            bind: None,
            chunk_payload_size: default_chunk_payload_size(),
            max_pending_frames: default_max_pending_frames(),
            max_frame_size: default_max_frame_size(),
            keepalive_interval_secs: default_keepalive_interval(),
            register_timeout_secs: default_register_timeout(),
            poll_timeout_ms: default_poll_timeout(),
            recv_buffer_size: None,
        }
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port() == 0 {
            return Err(ConfigError::Invalid("server port cannot be 0".into()));
        }
        if self.max_pending_frames == 0 {
            return Err(ConfigError::Invalid(
                "max_pending_frames cannot be 0".into(),
            ));
        }
        if self.keepalive_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "keepalive_interval_secs cannot be 0".into(),
            ));
        }
        Ok(())
    }

    /// Local address to bind, matching the server's address family.
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind.unwrap_or_else(|| match self.server {
            SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED), 0),
        })
    }

    pub fn reassembler(&self) -> ReassemblerConfig {
        ReassemblerConfig {
            chunk_payload_size: self.chunk_payload_size,
            max_pending_frames: self.max_pending_frames,
            max_frame_size: self.max_frame_size,
        }
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    pub fn register_timeout(&self) -> Duration {
        Duration::from_secs(self.register_timeout_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}
