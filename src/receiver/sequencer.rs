//! RTP reordering and loss recovery
//!
//! The [`Sequencer`] takes packets in receipt order and hands them downstream
//! in sequence order. Packets that arrive ahead of a gap are held; while
//! anything is held, [`Sequencer::tick`] is expected every tick period and
//! escalates per-seqno retry counters, producing rerequests at the configured
//! levels and abandoning gaps that reach the give-up level.

use std::collections::HashMap;

use serde::Serialize;

use crate::protocol::rtp::{RetransmitRequest, SeqNo, delta};
use crate::receiver::arena::Packet;
use crate::receiver::config::SequencerConfig;
use crate::receiver::sequence_log::{Disposition, SequenceObserver, TracingObserver};

/// Reorder and recovery state for one RTP stream
pub struct Sequencer<O = TracingObserver> {
    rerequest_ticks: Vec<u32>,
    give_up_tick: u32,
    /// Next sequence number to deliver
    low: SeqNo,
    initialized: bool,
    closed: bool,
    /// Out-of-order packets, all strictly ahead of `low`
    held: HashMap<SeqNo, Packet>,
    /// Ticks each missing sequence number has been outstanding
    retry_count: HashMap<SeqNo, u32>,
    stats: SequencerStats,
    observer: O,
}

/// Counters for a [`Sequencer`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SequencerStats {
    /// Packets handed to `handle`
    pub received: u64,
    /// Packets delivered downstream
    pub delivered: u64,
    /// Packets behind the delivery point
    pub stale: u64,
    /// Second copies of held packets
    pub duplicates: u64,
    /// Retransmitted packets dropped because the stream had not started
    pub not_started: u64,
    /// Packets currently held
    pub held: usize,
    /// Rerequests issued
    pub rerequests: u64,
    /// Gaps abandoned
    pub evicted_gaps: u64,
    /// Sequence numbers abandoned
    pub evicted_packets: u64,
    /// Flushes
    pub flushes: u64,
}

impl Sequencer<TracingObserver> {
    /// Create a sequencer that logs through `tracing`
    #[must_use]
    pub fn new(config: &SequencerConfig) -> Self {
        Self::with_observer(config, TracingObserver)
    }
}

impl<O: SequenceObserver> Sequencer<O> {
    /// Create a sequencer reporting to `observer`
    #[must_use]
    pub fn with_observer(config: &SequencerConfig, observer: O) -> Self {
        Self {
            rerequest_ticks: config.rerequest_ticks.clone(),
            give_up_tick: config.give_up_tick,
            low: SeqNo::default(),
            initialized: false,
            closed: false,
            held: HashMap::new(),
            retry_count: HashMap::new(),
            stats: SequencerStats::default(),
            observer,
        }
    }

    /// Accept one received packet, delivering whatever is now in order.
    pub fn handle<F>(&mut self, packet: Packet, mut deliver: F)
    where
        F: FnMut(Packet),
    {
        let seqno = packet.seqno();
        let retransmitted = packet.is_retransmitted();

        if self.closed {
            self.observer
                .on_input(seqno, retransmitted, Disposition::Closed);
            return;
        }
        self.stats.received += 1;

        if !self.initialized {
            if retransmitted {
                // Late recovery reply from before a restart
                self.stats.not_started += 1;
                self.observer
                    .on_input(seqno, retransmitted, Disposition::NotStarted);
                return;
            }
            self.low = seqno;
            self.initialized = true;
        }

        self.retry_count.remove(&seqno);

        let offset = delta(seqno, self.low);
        if offset == 0 {
            self.observer
                .on_input(seqno, retransmitted, Disposition::Delivered);
            self.emit(packet, &mut deliver);
            self.low = self.low.next();
            self.drain(&mut deliver);
        } else if offset < 0 {
            self.stats.stale += 1;
            self.observer
                .on_input(seqno, retransmitted, Disposition::Stale);
        } else if self.held.contains_key(&seqno) {
            self.stats.duplicates += 1;
            self.observer
                .on_input(seqno, retransmitted, Disposition::Duplicate);
        } else {
            self.observer
                .on_input(seqno, retransmitted, Disposition::Held);
            self.held.insert(seqno, packet);
        }
    }

    /// Drop a packet without considering it for delivery, counting it stale
    pub fn discard(&mut self, packet: Packet) {
        if self.closed {
            return;
        }
        self.stats.received += 1;
        self.stats.stale += 1;
        self.observer
            .on_input(packet.seqno(), packet.is_retransmitted(), Disposition::Stale);
    }

    /// Advance retry counters for every missing sequence number.
    ///
    /// Returns the rerequests due this tick. Gaps reaching the give-up level
    /// are skipped, which may deliver packets that were waiting behind them.
    pub fn tick<F>(&mut self, mut deliver: F) -> Vec<RetransmitRequest>
    where
        F: FnMut(Packet),
    {
        let mut requests = Vec::new();
        if self.closed || self.held.is_empty() {
            return requests;
        }

        for (start, count, level) in self.missing_runs() {
            if level >= self.give_up_tick {
                self.evict(start, count, &mut deliver);
            } else if self.rerequest_ticks.contains(&level) {
                let request = RetransmitRequest::new(start, count);
                self.stats.rerequests += 1;
                self.observer.on_rerequest(&request, level);
                requests.push(request);
            }
        }

        requests
    }

    /// Forget everything; the next primary packet sets the delivery point.
    pub fn flush(&mut self) {
        self.held.clear();
        self.retry_count.clear();
        self.initialized = false;
        self.stats.flushes += 1;
        self.observer.on_flush();
    }

    /// Release held packets and refuse further input
    pub fn close(&mut self) {
        self.held.clear();
        self.retry_count.clear();
        self.initialized = false;
        self.closed = true;
    }

    /// Next sequence number to be delivered, once the stream has started
    #[must_use]
    pub fn low(&self) -> Option<SeqNo> {
        self.initialized.then_some(self.low)
    }

    /// Whether a delivery point has been established
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether `close` has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether any gap is open, i.e. ticks are needed
    #[must_use]
    pub fn in_recovery(&self) -> bool {
        !self.held.is_empty()
    }

    /// Number of packets held
    #[must_use]
    pub fn held_len(&self) -> usize {
        self.held.len()
    }

    /// Distance `seqno` is ahead of the delivery point
    #[must_use]
    pub fn lead(&self, seqno: SeqNo) -> Option<i32> {
        self.initialized.then(|| delta(seqno, self.low))
    }

    /// Current counters
    #[must_use]
    pub fn stats(&self) -> SequencerStats {
        SequencerStats {
            held: self.held.len(),
            ..self.stats
        }
    }

    /// The observer
    #[must_use]
    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Walk from `low` to the newest held packet, bump the counter of every
    /// missing sequence number and return each missing run with its lowest
    /// counter.
    fn missing_runs(&mut self) -> Vec<(SeqNo, u16, u32)> {
        let span = self
            .held
            .keys()
            .map(|&seqno| delta(seqno, self.low))
            .max()
            .unwrap_or(0);
        let span = u16::try_from(span).unwrap_or(0);

        let mut runs = Vec::new();
        let mut current: Option<(SeqNo, u16, u32)> = None;

        for offset in 0..span {
            let seqno = self.low.wrapping_add(offset);
            if self.held.contains_key(&seqno) {
                if let Some(run) = current.take() {
                    runs.push(run);
                }
                continue;
            }

            let retries = self.retry_count.entry(seqno).or_insert(0);
            *retries += 1;
            let retries = *retries;

            match current.as_mut() {
                Some((_, count, level)) => {
                    *count += 1;
                    *level = (*level).min(retries);
                }
                None => current = Some((seqno, 1, retries)),
            }
        }

        if let Some(run) = current {
            runs.push(run);
        }
        runs
    }

    fn evict<F>(&mut self, start: SeqNo, count: u16, deliver: &mut F)
    where
        F: FnMut(Packet),
    {
        for offset in 0..count {
            self.retry_count.remove(&start.wrapping_add(offset));
        }
        self.stats.evicted_gaps += 1;
        self.stats.evicted_packets += u64::from(count);
        self.observer.on_evict(start, count);

        if start == self.low {
            self.low = start.wrapping_add(count);
            self.drain(deliver);
        }
    }

    fn drain<F>(&mut self, deliver: &mut F)
    where
        F: FnMut(Packet),
    {
        while let Some(packet) = self.held.remove(&self.low) {
            self.emit(packet, deliver);
            self.low = self.low.next();
        }

        if self.held.is_empty() {
            self.retry_count.clear();
        }
    }

    fn emit<F>(&mut self, packet: Packet, deliver: &mut F)
    where
        F: FnMut(Packet),
    {
        self.stats.delivered += 1;
        self.observer.on_output(packet.seqno());
        deliver(packet);
    }
}
