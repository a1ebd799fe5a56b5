// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Frame reassembly (receiver side).
//!
//! Each frame id moves through `ABSENT -> PENDING -> COMPLETE`. A frame-start
//! allocates a zero-filled buffer; chunks are copied in at
//! `chunk_index * chunk_payload_size`; the entry is removed and handed out the
//! moment its last chunk lands. Chunks may arrive in any order.
//!
//! There is no timeout. Memory is bounded by `max_pending_frames`: when a new
//! frame-start pushes the table past the bound, the entry with the smallest
//! frame id is dropped.
//!
//! # Wraparound
//!
//! "Smallest id" is not "oldest". Right after the sender's counter wraps, a
//! fresh frame 0 is evicted ahead of a stale frame near `u32::MAX`. Frames near
//! the wrap may be lost until the stale high ids are flushed out.
//!
//! ```ignore
//! let mut reassembler = FrameReassembler::new(ReassemblerConfig::default());
//! if let Some(frame) = reassembler.on_frame_start(start) { deliver(frame); }
//! if let Some(frame) = reassembler.on_chunk(chunk) { deliver(frame); }
//! ```

use std::collections::HashMap;

use crate::packetizer::effective_chunk_size;
use crate::protocol::{Chunk, FrameId, FrameStart, DEFAULT_CHUNK_PAYLOAD_SIZE};

/// Reassembler configuration.
#[derive(Debug, Clone)]
pub struct ReassemblerConfig {
    /// Chunk payload size the sender uses (not carried on the wire).
    pub chunk_payload_size: usize,
    /// Maximum concurrently pending frames.
    pub max_pending_frames: usize,
    /// Largest `total_size` accepted from a frame-start.
    pub max_frame_size: usize,
}

impl Default for ReassemblerConfig {
    fn default() -> Self {
        Self {
            chunk_payload_size: DEFAULT_CHUNK_PAYLOAD_SIZE,
            max_pending_frames: 5,
            max_frame_size: 64 * 1024 * 1024, // 64 MB
        }
    }
}

/// A fully reassembled frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedFrame {
    pub frame_id: FrameId,
    pub payload: Vec<u8>,
}

/// Reassembler statistics.
#[derive(Debug, Default, Clone)]
pub struct ReassemblerStats {
    /// Frame-starts accepted.
    pub frames_started: u64,
    /// Frames handed out complete.
    pub frames_completed: u64,
    /// Pending frames dropped by the capacity bound.
    pub frames_evicted: u64,
    /// Pending frames overwritten by a new frame-start with the same id.
    pub frames_superseded: u64,
    /// Chunks copied into a buffer.
    pub chunks_accepted: u64,
    /// Chunks for a frame id with no pending entry.
    pub chunks_unknown_frame: u64,
    /// Chunks whose byte range falls outside the buffer.
    pub chunks_out_of_range: u64,
    /// Chunks whose index was already received.
    pub chunks_duplicate: u64,
    /// Frame-starts rejected as inconsistent.
    pub malformed_headers: u64,
    /// Current pending frames.
    pub pending_frames: usize,
}

#[derive(Debug)]
struct PendingFrame {
    buffer: Vec<u8>,
    received: Vec<bool>,
    chunks_remaining: u32,
}

/// Per-frame-id chunk accumulator.
#[derive(Debug)]
pub struct FrameReassembler {
    config: ReassemblerConfig,
    chunk_size: usize,
    pending: HashMap<FrameId, PendingFrame>,
    stats: ReassemblerStats,
}

impl FrameReassembler {
    pub fn new(config: ReassemblerConfig) -> Self {
        let chunk_size = effective_chunk_size(config.chunk_payload_size);
        Self {
            config,
            chunk_size,
            pending: HashMap::new(),
            stats: ReassemblerStats::default(),
        }
    }

    /// Get statistics.
    pub fn stats(&self) -> ReassemblerStats {
        let mut stats = self.stats.clone();
        stats.pending_frames = self.pending.len();
        stats
    }

    /// Number of frames currently being assembled.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether `frame_id` is pending.
    pub fn is_pending(&self, frame_id: FrameId) -> bool {
        self.pending.contains_key(&frame_id)
    }

    /// Handle a frame-start.
    ///
    /// Returns the frame immediately when it is empty (`total_size == 0`,
    /// `chunk_count == 0`). An existing entry with the same id is replaced.
    pub fn on_frame_start(&mut self, start: FrameStart) -> Option<CompletedFrame> {
        let total_size = start.total_size as usize;
        let chunk_count = start.chunk_count;

        // Every chunk carries at least one byte, and a non-empty frame needs
        // at least one chunk.
        let consistent =
            (chunk_count == 0) == (total_size == 0) && chunk_count as usize <= total_size;
        if !consistent || total_size > self.config.max_frame_size {
            log::debug!(
                "[reassembler] dropping frame-start {} (size={}, chunks={})",
                start.frame_id,
                total_size,
                chunk_count
            );
            self.stats.malformed_headers += 1;
            return None;
        }

        self.stats.frames_started += 1;

        if chunk_count == 0 {
            // Nothing to wait for; also clears any stale entry under this id
            if self.pending.remove(&start.frame_id).is_some() {
                self.stats.frames_superseded += 1;
            }
            self.stats.frames_completed += 1;
            return Some(CompletedFrame {
                frame_id: start.frame_id,
                payload: Vec::new(),
            });
        }

        let entry = PendingFrame {
            buffer: vec![0u8; total_size],
            received: vec![false; chunk_count as usize],
            chunks_remaining: chunk_count,
        };
        if self.pending.insert(start.frame_id, entry).is_some() {
            self.stats.frames_superseded += 1;
        }

        while self.pending.len() > self.config.max_pending_frames {
            self.evict_smallest();
        }

        None
    }

    /// Handle a chunk.
    ///
    /// Returns the frame when this chunk was the last one missing.
    pub fn on_chunk(&mut self, chunk: Chunk<'_>) -> Option<CompletedFrame> {
        let chunk_size = self.chunk_size;
        let Some(frame) = self.pending.get_mut(&chunk.frame_id) else {
            self.stats.chunks_unknown_frame += 1;
            return None;
        };

        let index = chunk.chunk_index as usize;
        let range = index
            .checked_mul(chunk_size)
            .and_then(|start| start.checked_add(chunk.payload.len()).map(|end| start..end));
        let range = match range {
            Some(r) if r.end <= frame.buffer.len() && index < frame.received.len() => r,
            _ => {
                self.stats.chunks_out_of_range += 1;
                return None;
            }
        };

        if frame.received[index] {
            self.stats.chunks_duplicate += 1;
            return None;
        }

        frame.buffer[range].copy_from_slice(chunk.payload);
        frame.received[index] = true;
        frame.chunks_remaining -= 1;
        self.stats.chunks_accepted += 1;

        if frame.chunks_remaining > 0 {
            return None;
        }

        let frame = self.pending.remove(&chunk.frame_id)?;
        self.stats.frames_completed += 1;
        Some(CompletedFrame {
            frame_id: chunk.frame_id,
            payload: frame.buffer,
        })
    }

    /// Drop every pending frame.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    fn evict_smallest(&mut self) {
        if let Some(&smallest) = self.pending.keys().min() {
            self.pending.remove(&smallest);
            self.stats.frames_evicted += 1;
            log::trace!("[reassembler] evicted incomplete frame {}", smallest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packetizer::packetize;
    use crate::protocol::Datagram;

    fn config(chunk_payload_size: usize) -> ReassemblerConfig {
        ReassemblerConfig {
            chunk_payload_size,
            ..Default::default()
        }
    }

    fn start(frame_id: FrameId, total_size: u32, chunk_count: u32) -> FrameStart {
        FrameStart {
            frame_id,
            total_size,
            chunk_count,
        }
    }

    /// Feed raw packets, returning every completed frame.
    fn feed(reassembler: &mut FrameReassembler, packets: &[Vec<u8>]) -> Vec<CompletedFrame> {
        let mut done = Vec::new();
        for packet in packets {
            let completed = match Datagram::parse(packet) {
                Ok(Datagram::FrameStart(s)) => reassembler.on_frame_start(s),
                Ok(Datagram::Chunk(c)) => reassembler.on_chunk(c),
                _ => None,
            };
            done.extend(completed);
        }
        done
    }

    // ========================================================================
    // Basic assembly
    // ========================================================================

    #[test]
    fn test_in_order() {
        let data: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
        let packets = packetize(&data, 5, 1200).unwrap();
        let mut reassembler = FrameReassembler::new(config(1200));

        let done = feed(&mut reassembler, &packets);

        assert_eq!(done.len(), 1);
        assert_eq!(done[0].frame_id, 5);
        assert_eq!(done[0].payload, data);
        assert_eq!(reassembler.pending_count(), 0);
    }

    #[test]
    fn test_chunks_out_of_order() {
        let data = vec![b'A'; 2500];
        let packets = packetize(&data, 123, 1000).unwrap();
        let mut reassembler = FrameReassembler::new(config(1000));

        // start, then chunks 2, 0, 1
        let order = [0usize, 3, 1, 2];
        let mut done = Vec::new();
        for (step, i) in order.iter().enumerate() {
            let got = feed(&mut reassembler, std::slice::from_ref(&packets[*i]));
            if step < order.len() - 1 {
                assert!(got.is_empty(), "completed early at step {}", step);
            }
            done.extend(got);
        }

        assert_eq!(done.len(), 1);
        assert_eq!(done[0].payload, data);
    }

    #[test]
    fn test_any_permutation_yields_payload() {
        let mut rng = fastrand::Rng::with_seed(0x5EED);
        for round in 0..100 {
            let len = rng.usize(1..20_000);
            let size = rng.usize(1..2048);
            let data: Vec<u8> = (0..len).map(|_| rng.u8(..)).collect();
            let packets = packetize(&data, round, size).unwrap();

            let mut chunks = packets[1..].to_vec();
            rng.shuffle(&mut chunks);

            let mut reassembler = FrameReassembler::new(config(size));
            assert!(feed(&mut reassembler, &packets[..1]).is_empty());
            let done = feed(&mut reassembler, &chunks);

            assert_eq!(done.len(), 1, "round {}", round);
            assert_eq!(done[0].payload, data, "round {}", round);
        }
    }

    #[test]
    fn test_empty_frame_completes_immediately() {
        let mut reassembler = FrameReassembler::new(ReassemblerConfig::default());
        let done = reassembler.on_frame_start(start(9, 0, 0));

        assert_eq!(
            done,
            Some(CompletedFrame {
                frame_id: 9,
                payload: Vec::new()
            })
        );
        assert_eq!(reassembler.pending_count(), 0);
    }

    // ========================================================================
    // Drops
    // ========================================================================

    #[test]
    fn test_chunk_for_unknown_frame_dropped() {
        let mut reassembler = FrameReassembler::new(config(4));
        let done = reassembler.on_chunk(Chunk {
            frame_id: 77,
            chunk_index: 0,
            payload: b"abcd",
        });

        assert!(done.is_none());
        assert_eq!(reassembler.stats().chunks_unknown_frame, 1);
        assert_eq!(reassembler.pending_count(), 0);
    }

    #[test]
    fn test_chunk_after_completion_dropped() {
        let packets = packetize(b"hello", 3, 4).unwrap();
        let mut reassembler = FrameReassembler::new(config(4));
        assert_eq!(feed(&mut reassembler, &packets).len(), 1);

        // Replay of the last chunk finds no entry
        assert!(feed(&mut reassembler, &packets[2..]).is_empty());
        assert_eq!(reassembler.stats().chunks_unknown_frame, 1);
    }

    #[test]
    fn test_out_of_range_chunk_dropped_without_side_effects() {
        let mut reassembler = FrameReassembler::new(config(4));
        reassembler.on_frame_start(start(1, 10, 3));

        // index 2 * 4 + 4 = 12 > 10
        assert!(reassembler
            .on_chunk(Chunk {
                frame_id: 1,
                chunk_index: 2,
                payload: b"WXYZ",
            })
            .is_none());
        // index beyond chunk_count with an empty payload
        assert!(reassembler
            .on_chunk(Chunk {
                frame_id: 1,
                chunk_index: 3,
                payload: b"",
            })
            .is_none());
        // index far past the end
        assert!(reassembler
            .on_chunk(Chunk {
                frame_id: 1,
                chunk_index: u32::MAX,
                payload: b"a",
            })
            .is_none());
        assert_eq!(reassembler.stats().chunks_out_of_range, 3);

        // Valid chunks still complete the frame with the right content
        let mut done = None;
        for (i, part) in [&b"0123"[..], b"4567", b"89"].iter().enumerate() {
            done = reassembler.on_chunk(Chunk {
                frame_id: 1,
                chunk_index: i as u32,
                payload: part,
            });
        }
        assert_eq!(done.unwrap().payload, b"0123456789");
    }

    #[test]
    fn test_duplicate_chunk_does_not_complete_early() {
        let packets = packetize(&[1u8; 30], 4, 10).unwrap();
        let mut reassembler = FrameReassembler::new(config(10));

        feed(&mut reassembler, &packets[..2]);
        // chunk 0 three times: would reach zero remaining without tracking
        assert!(feed(&mut reassembler, &packets[1..2]).is_empty());
        assert!(feed(&mut reassembler, &packets[1..2]).is_empty());
        assert!(reassembler.is_pending(4));
        assert_eq!(reassembler.stats().chunks_duplicate, 2);

        assert_eq!(feed(&mut reassembler, &packets[2..]).len(), 1);
    }

    #[test]
    fn test_malformed_frame_start_dropped() {
        let mut reassembler = FrameReassembler::new(ReassemblerConfig {
            max_frame_size: 1000,
            ..Default::default()
        });

        assert!(reassembler.on_frame_start(start(1, 10, 0)).is_none());
        assert!(reassembler.on_frame_start(start(2, 0, 3)).is_none());
        assert!(reassembler.on_frame_start(start(3, 2, 5)).is_none());
        assert!(reassembler.on_frame_start(start(4, 1001, 1)).is_none());

        assert_eq!(reassembler.pending_count(), 0);
        assert_eq!(reassembler.stats().malformed_headers, 4);
    }

    // ========================================================================
    // Table management
    // ========================================================================

    #[test]
    fn test_restart_supersedes_incomplete_frame() {
        let mut reassembler = FrameReassembler::new(config(4));
        reassembler.on_frame_start(start(8, 8, 2));
        reassembler.on_chunk(Chunk {
            frame_id: 8,
            chunk_index: 0,
            payload: b"OLD!",
        });

        // Same id starts again with a different shape
        reassembler.on_frame_start(start(8, 4, 1));
        let done = reassembler.on_chunk(Chunk {
            frame_id: 8,
            chunk_index: 0,
            payload: b"new!",
        });

        assert_eq!(done.unwrap().payload, b"new!");
        assert_eq!(reassembler.stats().frames_superseded, 1);
    }

    #[test]
    fn test_sixth_pending_frame_evicts_smallest_id() {
        let mut reassembler = FrameReassembler::new(config(4));
        for id in [40, 10, 30, 50, 20] {
            reassembler.on_frame_start(start(id, 8, 2));
        }
        assert_eq!(reassembler.pending_count(), 5);

        reassembler.on_frame_start(start(60, 8, 2));

        assert_eq!(reassembler.pending_count(), 5);
        assert!(!reassembler.is_pending(10));
        for id in [20, 30, 40, 50, 60] {
            assert!(reassembler.is_pending(id));
        }
        assert_eq!(reassembler.stats().frames_evicted, 1);
    }

    #[test]
    fn test_eviction_near_wraparound_drops_new_low_id() {
        let mut reassembler = FrameReassembler::new(config(4));
        for id in (u32::MAX - 4)..=u32::MAX {
            reassembler.on_frame_start(start(id, 8, 2));
        }
        // Counter wrapped: the newest frame has the smallest id
        reassembler.on_frame_start(start(0, 8, 2));

        assert!(!reassembler.is_pending(0));
        assert!(reassembler.is_pending(u32::MAX - 4));
    }

    #[test]
    fn test_interleaved_frames() {
        let a = vec![0xAA; 3000];
        let b = vec![0xBB; 2000];
        let pa = packetize(&a, 1, 1000).unwrap();
        let pb = packetize(&b, 2, 1000).unwrap();
        let mut reassembler = FrameReassembler::new(config(1000));

        let mut mixed = vec![pb[0].clone(), pa[0].clone()];
        for i in 1..4 {
            mixed.push(pa[i].clone());
            if i < pb.len() {
                mixed.push(pb[i].clone());
            }
        }
        let done = feed(&mut reassembler, &mixed);

        assert_eq!(done.len(), 2);
        assert!(done.iter().any(|f| f.frame_id == 1 && f.payload == a));
        assert!(done.iter().any(|f| f.frame_id == 2 && f.payload == b));
    }
}
