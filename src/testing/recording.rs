//! Observer that records sequencer events for assertions

use std::sync::{Arc, Mutex, PoisonError};

use crate::protocol::rtp::{RetransmitRequest, SeqNo};
use crate::receiver::sequence_log::{Disposition, SequenceObserver};

/// One observed sequencer event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceEvent {
    /// A packet was handed in
    Input {
        /// Sequence number
        seqno: SeqNo,
        /// Arrived as a retransmit response
        retransmitted: bool,
        /// Outcome
        disposition: Disposition,
    },
    /// A packet was delivered
    Output(SeqNo),
    /// A rerequest was issued
    Rerequest {
        /// The request
        request: RetransmitRequest,
        /// Retry level that triggered it
        level: u32,
    },
    /// A gap was abandoned
    Evict {
        /// First abandoned sequence number
        first: SeqNo,
        /// Number abandoned
        count: u16,
    },
    /// The sequencer was reset
    Flush,
}

/// Shared, cloneable event recorder
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<SequenceEvent>>>,
}

impl RecordingObserver {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events so far
    #[must_use]
    pub fn events(&self) -> Vec<SequenceEvent> {
        self.lock().clone()
    }

    /// Delivered sequence numbers, in delivery order
    #[must_use]
    pub fn outputs(&self) -> Vec<u16> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                SequenceEvent::Output(seqno) => Some(seqno.0),
                _ => None,
            })
            .collect()
    }

    /// Rerequests as `(first, count)`
    #[must_use]
    pub fn rerequests(&self) -> Vec<(u16, u16)> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                SequenceEvent::Rerequest { request, .. } => Some((request.first.0, request.count)),
                _ => None,
            })
            .collect()
    }

    /// Abandoned gaps as `(first, count)`
    #[must_use]
    pub fn evictions(&self) -> Vec<(u16, u16)> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                SequenceEvent::Evict { first, count } => Some((first.0, *count)),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded events
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SequenceEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, event: SequenceEvent) {
        self.lock().push(event);
    }
}

impl SequenceObserver for RecordingObserver {
    fn on_input(&mut self, seqno: SeqNo, retransmitted: bool, disposition: Disposition) {
        self.push(SequenceEvent::Input {
            seqno,
            retransmitted,
            disposition,
        });
    }

    fn on_output(&mut self, seqno: SeqNo) {
        self.push(SequenceEvent::Output(seqno));
    }

    fn on_rerequest(&mut self, request: &RetransmitRequest, level: u32) {
        self.push(SequenceEvent::Rerequest {
            request: *request,
            level,
        });
    }

    fn on_evict(&mut self, first: SeqNo, count: u16) {
        self.push(SequenceEvent::Evict { first, count });
    }

    fn on_flush(&mut self) {
        self.push(SequenceEvent::Flush);
    }
}
