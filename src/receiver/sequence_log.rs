//! Observation hooks for the sequencer
//!
//! The sequencer reports every decision through a [`SequenceObserver`] rather
//! than logging directly, so tests can assert on the exact event stream.

use crate::protocol::rtp::{RetransmitRequest, SeqNo};

/// What the sequencer did with an incoming packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Matched the expected sequence number and was delivered
    Delivered,
    /// Ahead of the expected sequence number, held until the gap closes
    Held,
    /// Behind the expected sequence number
    Stale,
    /// A copy of a packet already held
    Duplicate,
    /// Retransmitted packet arriving before the stream started
    NotStarted,
    /// Sequencer already closed
    Closed,
}

/// Receives sequencer events. Every method defaults to doing nothing.
pub trait SequenceObserver: Send {
    /// A packet was handed to the sequencer
    fn on_input(&mut self, _seqno: SeqNo, _retransmitted: bool, _disposition: Disposition) {}

    /// A packet was delivered downstream
    fn on_output(&mut self, _seqno: SeqNo) {}

    /// A rerequest was issued at the given retry level
    fn on_rerequest(&mut self, _request: &RetransmitRequest, _level: u32) {}

    /// A gap was given up on
    fn on_evict(&mut self, _first: SeqNo, _count: u16) {}

    /// The sequencer was reset
    fn on_flush(&mut self) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SequenceObserver for NoopObserver {}

/// Observer that writes `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SequenceObserver for TracingObserver {
    fn on_input(&mut self, seqno: SeqNo, retransmitted: bool, disposition: Disposition) {
        tracing::trace!(%seqno, retransmitted, ?disposition, "sequencer input");
    }

    fn on_output(&mut self, seqno: SeqNo) {
        tracing::trace!(%seqno, "sequencer output");
    }

    fn on_rerequest(&mut self, request: &RetransmitRequest, level: u32) {
        tracing::debug!(
            "Rerequest {}..{} ({} packets), retry level {}",
            request.first,
            request.last(),
            request.count,
            level
        );
    }

    fn on_evict(&mut self, first: SeqNo, count: u16) {
        tracing::debug!(
            "Giving up on {}..{} ({} packets)",
            first,
            first.wrapping_add(count.saturating_sub(1)),
            count
        );
    }

    fn on_flush(&mut self) {
        tracing::debug!("Sequencer flushed");
    }
}

impl<T: SequenceObserver + ?Sized> SequenceObserver for Box<T> {
    fn on_input(&mut self, seqno: SeqNo, retransmitted: bool, disposition: Disposition) {
        (**self).on_input(seqno, retransmitted, disposition);
    }

    fn on_output(&mut self, seqno: SeqNo) {
        (**self).on_output(seqno);
    }

    fn on_rerequest(&mut self, request: &RetransmitRequest, level: u32) {
        (**self).on_rerequest(request, level);
    }

    fn on_evict(&mut self, first: SeqNo, count: u16) {
        (**self).on_evict(first, count);
    }

    fn on_flush(&mut self) {
        (**self).on_flush();
    }
}
