// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire format.
//!
//! Every datagram starts with an ASCII tag. Multi-byte integers are
//! little-endian `u32` on both ends.
//!
//! ```text
//! FRAME_START | frame_id:u32 | total_size:u32 | chunk_count:u32        (23 bytes)
//! CHUNK       | frame_id:u32 | chunk_index:u32 | payload[..chunk size]  (13 + n bytes)
//! REGISTER_CLIENT                                                      client -> server
//! REGISTERED                                                           server -> client
//! KEEPALIVE                                                            client -> server, every 15s
//! DISCONNECT                                                           client -> server
//! ```
//!
//! Control datagrams carry no fields; they are matched by prefix so trailing
//! bytes are tolerated.

use crate::error::ProtocolError;

/// Sender-assigned frame identifier. Wraps to 0 after `u32::MAX`.
pub type FrameId = u32;

pub const FRAME_START_TAG: &[u8] = b"FRAME_START";
pub const CHUNK_TAG: &[u8] = b"CHUNK";
pub const REGISTER_CLIENT: &[u8] = b"REGISTER_CLIENT";
pub const REGISTERED: &[u8] = b"REGISTERED";
pub const KEEPALIVE: &[u8] = b"KEEPALIVE";
pub const DISCONNECT: &[u8] = b"DISCONNECT";

/// `FRAME_START` tag plus three `u32` fields.
pub const FRAME_START_HEADER_LEN: usize = 11 + 12;

/// `CHUNK` tag plus two `u32` fields.
pub const CHUNK_HEADER_LEN: usize = 5 + 8;

/// Chunk payload size used when the caller passes 0. Keeps a chunk datagram
/// under the common path MTU so IP never fragments it.
pub const DEFAULT_CHUNK_PAYLOAD_SIZE: usize = 1200;

/// Largest UDP payload over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65507;

/// Frame-start header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStart {
    pub frame_id: FrameId,
    /// Total payload bytes of the frame.
    pub total_size: u32,
    /// Number of chunk packets that follow.
    pub chunk_count: u32,
}

impl FrameStart {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FRAME_START_HEADER_LEN);
        buf.extend_from_slice(FRAME_START_TAG);
        buf.extend_from_slice(&self.frame_id.to_le_bytes());
        buf.extend_from_slice(&self.total_size.to_le_bytes());
        buf.extend_from_slice(&self.chunk_count.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < FRAME_START_HEADER_LEN {
            return Err(ProtocolError::Truncated {
                kind: "FRAME_START",
                len: buf.len(),
                needed: FRAME_START_HEADER_LEN,
            });
        }
        let fields = &buf[FRAME_START_TAG.len()..];
        Ok(Self {
            frame_id: read_u32_le(&fields[0..4]),
            total_size: read_u32_le(&fields[4..8]),
            chunk_count: read_u32_le(&fields[8..12]),
        })
    }
}

/// One chunk of a frame, borrowing its payload from the received datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub frame_id: FrameId,
    /// 0-based position of this chunk within the frame.
    pub chunk_index: u32,
    pub payload: &'a [u8],
}

impl<'a> Chunk<'a> {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(CHUNK_HEADER_LEN + self.payload.len());
        buf.extend_from_slice(CHUNK_TAG);
        buf.extend_from_slice(&self.frame_id.to_le_bytes());
        buf.extend_from_slice(&self.chunk_index.to_le_bytes());
        buf.extend_from_slice(self.payload);
        buf
    }

    fn decode(buf: &'a [u8]) -> Result<Self, ProtocolError> {
        if buf.len() < CHUNK_HEADER_LEN {
            return Err(ProtocolError::Truncated {
                kind: "CHUNK",
                len: buf.len(),
                needed: CHUNK_HEADER_LEN,
            });
        }
        let fields = &buf[CHUNK_TAG.len()..];
        Ok(Self {
            frame_id: read_u32_le(&fields[0..4]),
            chunk_index: read_u32_le(&fields[4..8]),
            payload: &buf[CHUNK_HEADER_LEN..],
        })
    }
}

/// A classified datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datagram<'a> {
    RegisterClient,
    Registered,
    Keepalive,
    Disconnect,
    FrameStart(FrameStart),
    Chunk(Chunk<'a>),
}

impl<'a> Datagram<'a> {
    /// Classify a received datagram by its tag.
    ///
    /// `FRAME_START` is tested before the shorter tags; no tag is a prefix of
    /// another so the order is otherwise irrelevant.
    pub fn parse(buf: &'a [u8]) -> Result<Self, ProtocolError> {
        if buf.starts_with(FRAME_START_TAG) {
            FrameStart::decode(buf).map(Datagram::FrameStart)
        } else if buf.starts_with(CHUNK_TAG) {
            Chunk::decode(buf).map(Datagram::Chunk)
        } else if buf.starts_with(REGISTER_CLIENT) {
            Ok(Datagram::RegisterClient)
        } else if buf.starts_with(REGISTERED) {
            Ok(Datagram::Registered)
        } else if buf.starts_with(KEEPALIVE) {
            Ok(Datagram::Keepalive)
        } else if buf.starts_with(DISCONNECT) {
            Ok(Datagram::Disconnect)
        } else {
            Err(ProtocolError::Unrecognized)
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Datagram::RegisterClient => "REGISTER_CLIENT",
            Datagram::Registered => "REGISTERED",
            Datagram::Keepalive => "KEEPALIVE",
            Datagram::Disconnect => "DISCONNECT",
            Datagram::FrameStart(_) => "FRAME_START",
            Datagram::Chunk(_) => "CHUNK",
        }
    }
}

#[inline]
fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
