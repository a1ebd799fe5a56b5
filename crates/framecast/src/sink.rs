// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Consumers of completed frames.

use crossbeam::channel::{Sender, TrySendError};

use crate::protocol::FrameId;
use crate::reassembler::CompletedFrame;

/// Receives every frame the client fully reassembles.
///
/// Called from the receive thread; a slow sink delays the next `recv`.
pub trait FrameSink: Send {
    fn accept(&mut self, frame_id: FrameId, payload: Vec<u8>);
}

impl<F> FrameSink for F
where
    F: FnMut(FrameId, Vec<u8>) + Send,
{
    fn accept(&mut self, frame_id: FrameId, payload: Vec<u8>) {
        self(frame_id, payload)
    }
}

/// Forward frames to a channel without blocking the receive thread.
///
/// A frame is dropped when a bounded channel is full or the receiver is gone.
impl FrameSink for Sender<CompletedFrame> {
    fn accept(&mut self, frame_id: FrameId, payload: Vec<u8>) {
        match self.try_send(CompletedFrame { frame_id, payload }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::debug!("[sink] consumer lagging, frame {} dropped", frame_id);
            }
            Err(TrySendError::Disconnected(_)) => {
                log::trace!("[sink] receiver gone, frame {} dropped", frame_id);
            }
        }
    }
}
