// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Frame payload sources.
//!
//! The streamer pulls one payload per cycle from a [`PayloadSource`]. How the
//! bytes were produced (JPEG, H.264, raw) is the source's business.
//!
//! - `Ok(Some(bytes))`: next frame payload
//! - `Ok(None)`: nothing ready yet; the streamer polls again shortly without
//!   consuming a frame id
//! - `Err(SourceError::Exhausted)`: stop streaming
//!
//! A paced source (the default) gets one payload per `1/fps` interval. An
//! unpaced source such as [`QueueSource`] is drained as soon as payloads are
//! ready, which suits encoder output that already carries its own timing.

use std::collections::VecDeque;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::error::SourceError;

/// Producer of frame payloads.
pub trait PayloadSource: Send {
    fn next_payload(&mut self) -> Result<Option<Vec<u8>>, SourceError>;

    /// Whether the streamer waits one frame interval after each payload.
    fn paced(&self) -> bool {
        true
    }
}

impl<F> PayloadSource for F
where
    F: FnMut() -> Result<Option<Vec<u8>>, SourceError> + Send,
{
    fn next_payload(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        self()
    }
}

// ============================================================================
// QueueSource - push-style producers (encoder callbacks)
// ============================================================================

/// Create a bounded queue: the producer pushes encoder output into the
/// [`QueueSender`], the streamer drains the [`QueueSource`].
pub fn queue(capacity: usize) -> (QueueSender, QueueSource) {
    let (tx, rx) = channel::bounded(capacity.max(1));
    (
        QueueSender { tx },
        QueueSource {
            rx,
            wait: Duration::from_millis(5),
        },
    )
}

/// Producer half of [`queue`].
#[derive(Clone)]
pub struct QueueSender {
    tx: Sender<Vec<u8>>,
}

impl QueueSender {
    /// Enqueue a payload without blocking.
    ///
    /// Returns `false` if the queue is full (the payload is discarded) or the
    /// source was dropped.
    pub fn try_push(&self, payload: Vec<u8>) -> bool {
        match self.tx.try_send(payload) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::trace!("[source] queue full, payload discarded");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Consumer half of [`queue`].
///
/// Waits up to 5ms for a payload, then reports "nothing ready". Once every
/// [`QueueSender`] is dropped and the queue drained, the source is exhausted.
pub struct QueueSource {
    rx: Receiver<Vec<u8>>,
    wait: Duration,
}

impl PayloadSource for QueueSource {
    fn next_payload(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        match self.rx.recv_timeout(self.wait) {
            Ok(payload) => Ok(Some(payload)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(SourceError::Exhausted),
        }
    }

    fn paced(&self) -> bool {
        false
    }
}

// ============================================================================
// TestSource - canned payloads
// ============================================================================

/// Source of canned payloads, for demos and tests.
pub struct TestSource {
    payloads: VecDeque<Vec<u8>>,
    repeat: bool,
}

impl TestSource {
    /// Yield the same payload forever.
    pub fn constant(payload: Vec<u8>) -> Self {
        Self {
            payloads: VecDeque::from(vec![payload]),
            repeat: true,
        }
    }

    /// Yield each payload once, then report exhaustion.
    pub fn sequence(payloads: Vec<Vec<u8>>) -> Self {
        Self {
            payloads: payloads.into(),
            repeat: false,
        }
    }

    /// Cycle through the payloads forever.
    pub fn cycle(payloads: Vec<Vec<u8>>) -> Self {
        Self {
            payloads: payloads.into(),
            repeat: true,
        }
    }
}

impl PayloadSource for TestSource {
    fn next_payload(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        let payload = self.payloads.pop_front().ok_or(SourceError::Exhausted)?;
        if self.repeat {
            self.payloads.push_back(payload.clone());
        }
        Ok(Some(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_exhausts() {
        let mut source = TestSource::sequence(vec![vec![1], vec![2]]);
        assert_eq!(source.next_payload().unwrap(), Some(vec![1]));
        assert_eq!(source.next_payload().unwrap(), Some(vec![2]));
        assert!(matches!(source.next_payload(), Err(SourceError::Exhausted)));
    }

    #[test]
    fn test_cycle_repeats() {
        let mut source = TestSource::cycle(vec![vec![1], vec![2]]);
        let got: Vec<_> = (0..5)
            .map(|_| source.next_payload().unwrap().unwrap()[0])
            .collect();
        assert_eq!(got, vec![1, 2, 1, 2, 1]);
    }

    #[test]
    fn test_empty_cycle_is_exhausted() {
        let mut source = TestSource::cycle(Vec::new());
        assert!(matches!(source.next_payload(), Err(SourceError::Exhausted)));
    }

    #[test]
    fn test_queue_source() {
        let (tx, mut source) = queue(2);

        assert_eq!(source.next_payload().unwrap(), None);

        assert!(tx.try_push(vec![1]));
        assert!(tx.try_push(vec![2]));
        assert!(!tx.try_push(vec![3])); // full

        assert_eq!(source.next_payload().unwrap(), Some(vec![1]));
        assert_eq!(source.next_payload().unwrap(), Some(vec![2]));

        drop(tx);
        assert!(matches!(source.next_payload(), Err(SourceError::Exhausted)));
    }

    #[test]
    fn test_pacing_defaults() {
        let (_tx, queue_source) = queue(1);
        assert!(!queue_source.paced());
        assert!(TestSource::constant(vec![0]).paced());
        let closure = || -> Result<Option<Vec<u8>>, SourceError> { Ok(None) };
        assert!(PayloadSource::paced(&closure));
    }

    #[test]
    fn test_closure_source() {
        let mut n = 0u8;
        let mut source = move || {
            n += 1;
            if n > 2 {
                Err(SourceError::Exhausted)
            } else {
                Ok(Some(vec![n]))
            }
        };
        assert_eq!(PayloadSource::next_payload(&mut source).unwrap(), Some(vec![1]));
        assert_eq!(PayloadSource::next_payload(&mut source).unwrap(), Some(vec![2]));
        assert!(PayloadSource::next_payload(&mut source).is_err());
    }
}
