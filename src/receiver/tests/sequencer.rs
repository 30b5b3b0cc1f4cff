use crate::protocol::rtp::{RetransmitRequest, SeqNo};
use crate::receiver::arena::PacketArena;
use crate::receiver::config::SequencerConfig;
use crate::receiver::sequence_log::Disposition;
use crate::receiver::sequencer::*;
use crate::testing::recording::{RecordingObserver, SequenceEvent};
use crate::testing::test_packet;

struct Harness {
    sequencer: Sequencer<RecordingObserver>,
    recorder: RecordingObserver,
    delivered: Vec<u16>,
    ticks: u32,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(&SequencerConfig::default())
    }

    fn with_config(config: &SequencerConfig) -> Self {
        let recorder = RecordingObserver::new();
        Self {
            sequencer: Sequencer::with_observer(config, recorder.clone()),
            recorder,
            delivered: Vec::new(),
            ticks: 0,
        }
    }

    fn feed(&mut self, seqnos: impl IntoIterator<Item = u16>) {
        for seqno in seqnos {
            self.push(seqno, false);
        }
    }

    fn recover(&mut self, seqnos: impl IntoIterator<Item = u16>) {
        for seqno in seqnos {
            self.push(seqno, true);
        }
    }

    fn push(&mut self, seqno: u16, retransmitted: bool) {
        let delivered = &mut self.delivered;
        self.sequencer
            .handle(test_packet(seqno, retransmitted), |p| delivered.push(p.seqno().0));
    }

    /// Tick once, returning rerequests as `(first, count)`
    fn tick(&mut self) -> Vec<(u16, u16)> {
        self.ticks += 1;
        let delivered = &mut self.delivered;
        self.sequencer
            .tick(|p| delivered.push(p.seqno().0))
            .iter()
            .map(|r| (r.first.0, r.count))
            .collect()
    }

    /// Tick `n` times, returning every rerequest with the tick it came on
    fn tick_n(&mut self, n: u32) -> Vec<(u32, u16, u16)> {
        let mut out = Vec::new();
        for _ in 0..n {
            for (first, count) in self.tick() {
                out.push((self.ticks, first, count));
            }
        }
        out
    }
}

#[test]
fn test_in_order_delivery() {
    let mut h = Harness::new();
    h.feed(100..110);

    assert_eq!(h.delivered, (100..110).collect::<Vec<_>>());
    assert_eq!(h.sequencer.low(), Some(SeqNo(110)));
    assert!(!h.sequencer.in_recovery());
    assert!(h.tick().is_empty());
}

#[test]
fn test_first_packet_sets_low() {
    let mut h = Harness::new();
    assert_eq!(h.sequencer.low(), None);
    assert!(!h.sequencer.is_initialized());

    h.feed([46542]);
    assert_eq!(h.sequencer.low(), Some(SeqNo(46543)));
    assert_eq!(h.delivered, vec![46542]);
}

#[test]
fn test_reorder_4_6_5_7() {
    let mut h = Harness::new();
    h.feed([4, 6, 5, 7]);

    assert_eq!(h.delivered, vec![4, 5, 6, 7]);
    assert_eq!(h.sequencer.held_len(), 0);
}

#[test]
fn test_held_until_gap_fills() {
    let mut h = Harness::new();
    h.feed([10, 12, 13]);

    assert_eq!(h.delivered, vec![10]);
    assert_eq!(h.sequencer.held_len(), 2);
    assert!(h.sequencer.in_recovery());

    h.recover([11]);
    assert_eq!(h.delivered, vec![10, 11, 12, 13]);
    assert!(!h.sequencer.in_recovery());
}

#[test]
fn test_stale_packet_dropped() {
    let mut h = Harness::new();
    h.feed([10, 11, 9, 10]);

    assert_eq!(h.delivered, vec![10, 11]);
    assert_eq!(h.sequencer.stats().stale, 2);
}

#[test]
fn test_duplicate_held_packet_dropped() {
    let mut h = Harness::new();
    h.feed([1, 3, 3]);
    assert_eq!(h.sequencer.held_len(), 1);
    assert_eq!(h.sequencer.stats().duplicates, 1);

    h.feed([2]);
    assert_eq!(h.delivered, vec![1, 2, 3]);
}

#[test]
fn test_delivery_across_wrap() {
    let mut h = Harness::new();
    h.feed([65534, 65535, 0, 1]);
    assert_eq!(h.delivered, vec![65534, 65535, 0, 1]);
}

#[test]
fn test_reorder_across_wrap() {
    let mut h = Harness::new();
    h.feed([65534, 0, 1, 65535, 2]);
    assert_eq!(h.delivered, vec![65534, 65535, 0, 1, 2]);
}

#[test]
fn test_gap_across_wrap_rerequested() {
    let mut h = Harness::new();
    h.feed([65533, 2]);

    let requests = h.tick_n(3);
    assert_eq!(requests, vec![(3, 65534, 4)]);

    let request = RetransmitRequest::new(SeqNo(65534), 4);
    assert_eq!(request.last(), SeqNo(1));
}

#[test]
fn test_retransmitted_before_start_dropped() {
    let mut h = Harness::new();
    h.recover([500]);

    assert!(h.delivered.is_empty());
    assert!(!h.sequencer.is_initialized());
    assert_eq!(h.sequencer.stats().not_started, 1);

    h.feed([501, 502]);
    assert_eq!(h.delivered, vec![501, 502]);
}

#[test]
fn test_retry_ladder() {
    let mut h = Harness::new();
    h.feed(46542..=46544);
    h.feed([46549]);
    h.feed(46554..=46559);
    h.feed([46569, 46570]);
    h.feed([46545, 46547, 46548]);
    h.feed(46550..=46553);

    assert_eq!(h.delivered, (46542..=46545).collect::<Vec<_>>());

    assert!(h.tick().is_empty());
    assert!(h.tick().is_empty());
    assert_eq!(h.tick(), vec![(46546, 1), (46560, 9)]);

    h.recover([46546]);
    assert_eq!(h.delivered, (46542..=46559).collect::<Vec<_>>());

    // 46560..46568 went missing on the first tick
    assert_eq!(h.tick_n(8), vec![(11, 46560, 9)]);
}

#[test]
fn test_slow_response() {
    let mut h = Harness::new();
    h.feed([46542, 46543, 46544, 46547]);

    assert_eq!(h.tick_n(3), vec![(3, 46545, 2)]);
    assert!(h.tick_n(4).is_empty());

    h.recover([46545, 46546]);
    assert_eq!(h.delivered, (46542..=46547).collect::<Vec<_>>());
    assert!(!h.sequencer.in_recovery());
}

#[test]
fn test_partial_recovery_rerequests_remainder() {
    let mut h = Harness::new();
    h.feed([46542, 46543, 46544, 46547]);
    assert_eq!(h.tick_n(3), vec![(3, 46545, 2)]);

    h.recover([46546]);
    assert_eq!(h.sequencer.held_len(), 2);

    assert_eq!(h.tick_n(8), vec![(11, 46545, 1)]);
    h.recover([46545]);
    assert_eq!(h.delivered, (46542..=46547).collect::<Vec<_>>());
}

#[test]
fn test_give_up() {
    let mut h = Harness::new();
    h.feed([1, 3]);

    let requests = h.tick_n(36);
    assert_eq!(requests, vec![(3, 2, 1), (11, 2, 1), (23, 2, 1)]);
    assert_eq!(h.delivered, vec![1]);

    assert!(h.tick().is_empty());
    assert_eq!(h.delivered, vec![1, 3]);
    assert_eq!(h.recorder.evictions(), vec![(2, 1)]);
    assert_eq!(h.sequencer.low(), Some(SeqNo(4)));

    // The evicted seqno is now stale
    h.recover([2]);
    assert_eq!(h.delivered, vec![1, 3]);
    assert_eq!(h.sequencer.stats().stale, 1);
}

#[test]
fn test_give_up_only_oldest_gap() {
    let mut h = Harness::new();
    h.feed([1, 3]);
    h.tick_n(20);
    h.feed([5]);

    h.tick_n(17);
    assert_eq!(h.delivered, vec![1, 3]);
    assert_eq!(h.sequencer.low(), Some(SeqNo(4)));
    assert!(h.sequencer.in_recovery());

    // 4 was first missed 17 ticks ago
    h.tick_n(20);
    assert_eq!(h.delivered, vec![1, 3, 5]);
    assert_eq!(h.recorder.evictions(), vec![(2, 1), (4, 1)]);
}

#[test]
fn test_runs_escalate_independently() {
    let mut h = Harness::new();
    h.feed([1, 3]);
    h.tick_n(2);

    h.feed([6]);
    assert_eq!(h.tick_n(1), vec![(3, 2, 1)]);
    assert_eq!(h.tick_n(2), vec![(5, 4, 2)]);
}

#[test]
fn test_custom_ladder() {
    let config = SequencerConfig::default().retry_ladder(vec![1, 2], 3);
    let mut h = Harness::with_config(&config);
    h.feed([10, 12]);

    assert_eq!(h.tick(), vec![(11, 1)]);
    assert_eq!(h.tick(), vec![(11, 1)]);
    assert!(h.tick().is_empty());
    assert_eq!(h.delivered, vec![10, 12]);
}

#[test]
fn test_flush_resets_and_releases() {
    let arena = PacketArena::with_capacity(64, 16);
    let recorder = RecordingObserver::new();
    let mut sequencer = Sequencer::with_observer(&SequencerConfig::default(), recorder.clone());

    for seqno in [1u16, 3, 4] {
        let mut packet = arena.acquire();
        packet.set_seqno(SeqNo(seqno));
        sequencer.handle(packet, drop);
    }
    assert_eq!(arena.stats().outstanding, 2);

    sequencer.flush();
    assert_eq!(arena.stats().outstanding, 0);
    assert!(!sequencer.is_initialized());
    assert!(!sequencer.in_recovery());
    assert_eq!(recorder.events().last(), Some(&SequenceEvent::Flush));

    let mut delivered = Vec::new();
    sequencer.handle(test_packet(900, false), |p| delivered.push(p.seqno().0));
    assert_eq!(delivered, vec![900]);
    assert_eq!(sequencer.low(), Some(SeqNo(901)));
}

#[test]
fn test_retransmitted_after_flush_dropped() {
    let mut h = Harness::new();
    h.feed([1, 3]);
    h.sequencer.flush();

    h.recover([3]);
    assert_eq!(h.delivered, vec![1]);
    assert!(!h.sequencer.is_initialized());
    assert_eq!(h.sequencer.stats().not_started, 1);

    h.feed([50]);
    assert_eq!(h.delivered, vec![1, 50]);
    assert_eq!(h.sequencer.low(), Some(SeqNo(51)));
}

#[test]
fn test_discard_counts_stale() {
    let mut h = Harness::new();
    h.feed([1, 3]);
    h.sequencer.discard(test_packet(9000, true));

    assert_eq!(h.sequencer.held_len(), 1);
    assert_eq!(h.sequencer.low(), Some(SeqNo(2)));
    assert_eq!(h.sequencer.stats().stale, 1);
    assert_eq!(
        h.recorder.events().last(),
        Some(&SequenceEvent::Input {
            seqno: SeqNo(9000),
            retransmitted: true,
            disposition: Disposition::Stale,
        })
    );
}

#[test]
fn test_close_is_terminal() {
    let mut h = Harness::new();
    h.feed([1, 3]);
    h.sequencer.close();

    assert!(h.sequencer.is_closed());
    assert_eq!(h.sequencer.held_len(), 0);

    h.feed([2, 4]);
    assert!(h.tick().is_empty());
    assert_eq!(h.delivered, vec![1]);

    let closed = h
        .recorder
        .events()
        .into_iter()
        .filter(|e| {
            matches!(
                e,
                SequenceEvent::Input {
                    disposition: Disposition::Closed,
                    ..
                }
            )
        })
        .count();
    assert_eq!(closed, 2);
}

#[test]
fn test_lead() {
    let mut h = Harness::new();
    assert_eq!(h.sequencer.lead(SeqNo(5)), None);

    h.feed([65530]);
    assert_eq!(h.sequencer.lead(SeqNo(65531)), Some(0));
    assert_eq!(h.sequencer.lead(SeqNo(10)), Some(15));
    assert_eq!(h.sequencer.lead(SeqNo(65000)), Some(-531));
}

#[test]
fn test_stats() {
    let mut h = Harness::new();
    h.feed([1, 2, 4, 4, 0]);
    h.tick_n(3);
    h.recover([3]);

    let stats = h.sequencer.stats();
    assert_eq!(stats.received, 6);
    assert_eq!(stats.delivered, 4);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(stats.stale, 1);
    assert_eq!(stats.rerequests, 1);
    assert_eq!(stats.held, 0);
}

#[test]
fn test_observer_sees_rerequest_level() {
    let mut h = Harness::new();
    h.feed([1, 3]);
    h.tick_n(11);

    let levels: Vec<u32> = h
        .recorder
        .events()
        .into_iter()
        .filter_map(|e| match e {
            SequenceEvent::Rerequest { level, .. } => Some(level),
            _ => None,
        })
        .collect();
    assert_eq!(levels, vec![3, 11]);
    assert_eq!(h.recorder.rerequests(), vec![(2, 1), (2, 1)]);
}
