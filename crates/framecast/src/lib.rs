// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # framecast - chunked frame streaming over UDP
//!
//! Distributes a live sequence of opaque binary frames (JPEG images, H.264
//! access units, anything) from one producer to many receivers over plain
//! UDP. Latency wins over reliability: a frame missing a chunk is dropped.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use framecast::{ClientConfig, FrameClient, FrameServer, ServerConfig, TestSource};
//!
//! # fn main() -> Result<(), framecast::TransportError> {
//! // Sender
//! let server = FrameServer::bind(ServerConfig::default())?;
//! let handle = server.start(TestSource::constant(vec![0xAB; 4096]))?;
//!
//! // Receiver
//! let client = FrameClient::connect(ClientConfig::new("127.0.0.1:9999".parse().unwrap()))?;
//! let receiving = client.start(|frame_id: u32, payload: Vec<u8>| {
//!     println!("frame {} ({} bytes)", frame_id, payload.len());
//! })?;
//!
//! # receiving.stop();
//! # handle.stop();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//!  PayloadSource --> packetize --> streamer thread --> UDP --+
//!                                      ^                     |
//!                            SessionRegistry <-- listener <--+ (REGISTER/KEEPALIVE/DISCONNECT)
//!                                      ^
//!                                   sweeper
//!
//!  UDP --> client receive loop --> demux --> FrameReassembler --> FrameSink
//! ```
//!
//! ## Modules Overview
//!
//! - [`protocol`] - wire format (prefixes, headers, datagram classification)
//! - [`packetizer`] - frame payload to packet list
//! - [`reassembler`] - packet stream back to complete frames
//! - [`registry`] - sender-side client sessions
//! - [`server`] / [`client`] - the transport loops

pub mod client;
pub mod config;
pub mod demux;
pub mod error;
pub mod packetizer;
pub mod protocol;
pub mod reassembler;
pub mod registry;
pub mod server;
pub mod sink;
pub mod socket;
pub mod source;

pub use client::{ClientHandle, ClientStats, FrameClient};
pub use config::{ClientConfig, ServerConfig};
pub use demux::{dispatch, DatagramHandler};
pub use error::{ConfigError, PacketizeError, ProtocolError, SourceError, TransportError};
pub use packetizer::{chunk_count, packetize};
pub use protocol::{Chunk, Datagram, FrameId, FrameStart, DEFAULT_CHUNK_PAYLOAD_SIZE};
pub use reassembler::{CompletedFrame, FrameReassembler, ReassemblerConfig, ReassemblerStats};
pub use registry::{ClientSession, RegisterAck, SessionRegistry};
pub use server::{FrameServer, SenderStats, ServerHandle};
pub use sink::FrameSink;
pub use source::{queue, PayloadSource, QueueSender, QueueSource, TestSource};
