// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Datagram demultiplexing.
//!
//! Receive loops hand every datagram to [`dispatch`], which classifies it and
//! calls the matching [`DatagramHandler`] method. Malformed and unrecognized
//! datagrams are dropped here and never reach the handler.

use std::net::SocketAddr;

use crate::protocol::{Chunk, Datagram, FrameStart};

/// Per-kind callbacks. Every method defaults to ignoring the datagram.
pub trait DatagramHandler {
    fn on_register(&mut self, _source: SocketAddr) {}

    fn on_registered(&mut self, _source: SocketAddr) {}

    fn on_keepalive(&mut self, _source: SocketAddr) {}

    fn on_disconnect(&mut self, _source: SocketAddr) {}

    fn on_frame_start(&mut self, _source: SocketAddr, _start: FrameStart) {}

    fn on_chunk(&mut self, _source: SocketAddr, _chunk: Chunk<'_>) {}

    /// Called for datagrams that failed to parse.
    fn on_dropped(&mut self, _source: SocketAddr) {}
}

/// Classify `datagram` and route it to `handler`.
///
/// Returns `false` when the datagram was dropped.
pub fn dispatch<H: DatagramHandler + ?Sized>(
    datagram: &[u8],
    source: SocketAddr,
    handler: &mut H,
) -> bool {
    match Datagram::parse(datagram) {
        Ok(Datagram::RegisterClient) => handler.on_register(source),
        Ok(Datagram::Registered) => handler.on_registered(source),
        Ok(Datagram::Keepalive) => handler.on_keepalive(source),
        Ok(Datagram::Disconnect) => handler.on_disconnect(source),
        Ok(Datagram::FrameStart(start)) => handler.on_frame_start(source, start),
        Ok(Datagram::Chunk(chunk)) => handler.on_chunk(source, chunk),
        Err(e) => {
            log::trace!("[demux] dropped datagram from {}: {}", source, e);
            handler.on_dropped(source);
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packetizer::packetize;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl DatagramHandler for Recorder {
        fn on_register(&mut self, source: SocketAddr) {
            self.events.push(format!("register {}", source));
        }

        fn on_keepalive(&mut self, _source: SocketAddr) {
            self.events.push("keepalive".into());
        }

        fn on_frame_start(&mut self, _source: SocketAddr, start: FrameStart) {
            self.events.push(format!("start {}", start.frame_id));
        }

        fn on_chunk(&mut self, _source: SocketAddr, chunk: Chunk<'_>) {
            self.events
                .push(format!("chunk {}/{}", chunk.frame_id, chunk.chunk_index));
        }

        fn on_dropped(&mut self, _source: SocketAddr) {
            self.events.push("dropped".into());
        }
    }

    #[test]
    fn test_routes_by_prefix() {
        let src: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let mut rec = Recorder::default();

        assert!(dispatch(b"REGISTER_CLIENT", src, &mut rec));
        assert!(dispatch(b"KEEPALIVE", src, &mut rec));
        for packet in packetize(b"abc", 11, 2).unwrap() {
            assert!(dispatch(&packet, src, &mut rec));
        }

        assert_eq!(
            rec.events,
            vec![
                "register 127.0.0.1:4000",
                "keepalive",
                "start 11",
                "chunk 11/0",
                "chunk 11/1"
            ]
        );
    }

    #[test]
    fn test_unhandled_kinds_use_defaults() {
        let src: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let mut rec = Recorder::default();

        // Accepted but ignored by this handler
        assert!(dispatch(b"DISCONNECT", src, &mut rec));
        assert!(dispatch(b"REGISTERED", src, &mut rec));
        assert!(rec.events.is_empty());
    }

    #[test]
    fn test_drops_malformed_and_unknown() {
        let src: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let mut rec = Recorder::default();

        assert!(!dispatch(b"FRAME_START\x01\x00", src, &mut rec));
        assert!(!dispatch(b"CHUNK", src, &mut rec));
        assert!(!dispatch(b"PING", src, &mut rec));
        assert_eq!(rec.events, vec!["dropped", "dropped", "dropped"]);
    }
}
