// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Frame packetization (sender side).
//!
//! One frame becomes one `FRAME_START` packet followed by
//! `ceil(len / chunk_payload_size)` `CHUNK` packets in ascending index order.
//! No I/O happens here.

use crate::error::PacketizeError;
use crate::protocol::{Chunk, FrameId, FrameStart, DEFAULT_CHUNK_PAYLOAD_SIZE};

/// Resolve the chunk payload size, substituting the default for 0.
#[inline]
pub fn effective_chunk_size(chunk_payload_size: usize) -> usize {
    if chunk_payload_size == 0 {
        DEFAULT_CHUNK_PAYLOAD_SIZE
    } else {
        chunk_payload_size
    }
}

/// Number of chunk packets for a payload of `len` bytes.
pub fn chunk_count(len: usize, chunk_payload_size: usize) -> usize {
    len.div_ceil(effective_chunk_size(chunk_payload_size))
}

/// Split `payload` into wire packets.
///
/// `chunk_payload_size == 0` selects [`DEFAULT_CHUNK_PAYLOAD_SIZE`]. An empty
/// payload yields a single frame-start with `total_size = 0, chunk_count = 0`.
pub fn packetize(
    payload: &[u8],
    frame_id: FrameId,
    chunk_payload_size: usize,
) -> Result<Vec<Vec<u8>>, PacketizeError> {
    let chunk_size = effective_chunk_size(chunk_payload_size);
    let total_size =
        u32::try_from(payload.len()).map_err(|_| PacketizeError::PayloadTooLarge(payload.len()))?;
    // chunk_count <= total_size, so it fits as well
    let count = chunk_count(payload.len(), chunk_size) as u32;

    let mut packets = Vec::with_capacity(1 + count as usize);
    packets.push(
        FrameStart {
            frame_id,
            total_size,
            chunk_count: count,
        }
        .encode(),
    );

    for (chunk_index, data) in (0u32..).zip(payload.chunks(chunk_size)) {
        packets.push(
            Chunk {
                frame_id,
                chunk_index,
                payload: data,
            }
            .encode(),
        );
    }

    Ok(packets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Datagram;

    fn parse_start(packet: &[u8]) -> FrameStart {
        match Datagram::parse(packet) {
            Ok(Datagram::FrameStart(start)) => start,
            other => panic!("expected FRAME_START, got {:?}", other),
        }
    }

    fn parse_chunk(packet: &[u8]) -> Chunk<'_> {
        match Datagram::parse(packet) {
            Ok(Datagram::Chunk(chunk)) => chunk,
            other => panic!("expected CHUNK, got {:?}", other),
        }
    }

    #[test]
    fn test_packet_count_and_headers() {
        let data = vec![b'A'; 2500];
        let packets = packetize(&data, 123, 1000).unwrap();

        // 1 FRAME_START + 3 CHUNK
        assert_eq!(packets.len(), 4);
        assert_eq!(
            parse_start(&packets[0]),
            FrameStart {
                frame_id: 123,
                total_size: 2500,
                chunk_count: 3
            }
        );

        let sizes: Vec<usize> = packets[1..]
            .iter()
            .map(|p| parse_chunk(p).payload.len())
            .collect();
        assert_eq!(sizes, vec![1000, 1000, 500]);

        for (i, packet) in packets[1..].iter().enumerate() {
            let chunk = parse_chunk(packet);
            assert_eq!(chunk.frame_id, 123);
            assert_eq!(chunk.chunk_index, i as u32);
        }
    }

    #[test]
    fn test_chunk_payload_slicing() {
        let data = b"0123456789".repeat(100);
        let packets = packetize(&data, 1, 400).unwrap();

        assert_eq!(parse_start(&packets[0]).chunk_count, 3);
        assert_eq!(parse_chunk(&packets[1]).payload, &data[0..400]);
        assert_eq!(parse_chunk(&packets[2]).payload, &data[400..800]);
        assert_eq!(parse_chunk(&packets[3]).payload, &data[800..1000]);
    }

    #[test]
    fn test_zero_chunk_size_uses_default() {
        let data = vec![7u8; 1201];
        let packets = packetize(&data, 9, 0).unwrap();

        assert_eq!(parse_start(&packets[0]).chunk_count, 2);
        assert_eq!(parse_chunk(&packets[1]).payload.len(), 1200);
        assert_eq!(parse_chunk(&packets[2]).payload.len(), 1);
    }

    #[test]
    fn test_empty_payload() {
        let packets = packetize(&[], 42, 512).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(
            parse_start(&packets[0]),
            FrameStart {
                frame_id: 42,
                total_size: 0,
                chunk_count: 0
            }
        );
    }

    #[test]
    fn test_exact_multiple() {
        let data = vec![1u8; 3000];
        let packets = packetize(&data, 0, 1000).unwrap();
        assert_eq!(packets.len(), 4);
        assert_eq!(parse_chunk(&packets[3]).payload.len(), 1000);
    }

    #[test]
    fn test_packet_count_law() {
        let mut rng = fastrand::Rng::with_seed(7);
        for _ in 0..200 {
            let len = rng.usize(0..10_000);
            let size = rng.usize(0..3000);
            let data = vec![0u8; len];
            let packets = packetize(&data, rng.u32(..), size).unwrap();
            let effective = if size == 0 { 1200 } else { size };
            assert_eq!(packets.len(), 1 + len.div_ceil(effective));
            assert_eq!(packets.len(), 1 + chunk_count(len, size));
        }
    }

    #[test]
    fn test_max_frame_id() {
        let packets = packetize(b"xyz", u32::MAX, 2).unwrap();
        assert_eq!(parse_start(&packets[0]).frame_id, u32::MAX);
        assert_eq!(parse_chunk(&packets[2]).frame_id, u32::MAX);
    }
}
