use super::network_sim::{NetworkSimulator, packet_interval};
use super::recording::{RecordingObserver, SequenceEvent};
use super::*;
use crate::protocol::rtp::{ControlPacket, RtpHeader, SeqNo};
use crate::receiver::sequence_log::{Disposition, SequenceObserver};

#[test]
fn test_audio_datagram_header() {
    let datagram = audio_datagram(SeqNo(46545), &[1, 2, 3]);
    let header = RtpHeader::decode(&datagram).unwrap();

    assert_eq!(header.sequence, SeqNo(46545));
    assert_eq!(header.ssrc, TEST_SSRC);
    assert_eq!(&datagram[RtpHeader::SIZE..], &[1, 2, 3]);
}

#[test]
fn test_recovery_datagram_decodes() {
    let datagram = recovery_datagram(SeqNo(7), &audio_payload(SeqNo(7)));
    match ControlPacket::decode(&datagram).unwrap() {
        ControlPacket::Recovered { seqno, status } => {
            assert_eq!(seqno, SeqNo(7));
            assert_eq!(status, 0);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_declined_datagram_decodes() {
    let datagram = declined_datagram(SeqNo(9));
    assert_eq!(
        ControlPacket::decode(&datagram).unwrap(),
        ControlPacket::Declined { seqno: SeqNo(9) }
    );
}

#[test]
fn test_payload_differs_by_seqno() {
    assert_ne!(audio_payload(SeqNo(1)), audio_payload(SeqNo(2)));
    assert_eq!(audio_payload(SeqNo(1)), audio_payload(SeqNo(1)));
}

#[test]
fn test_packet_fields() {
    let packet = test_packet(100, true);
    assert_eq!(packet.seqno(), SeqNo(100));
    assert!(packet.is_retransmitted());
    assert_eq!(packet.payload(), audio_payload(SeqNo(100)).as_slice());
}

#[test]
fn test_recording_observer_shared_between_clones() {
    let recorder = RecordingObserver::new();
    let mut observer = recorder.clone();

    observer.on_input(SeqNo(1), false, Disposition::Delivered);
    observer.on_output(SeqNo(1));
    observer.on_evict(SeqNo(2), 3);
    observer.on_flush();

    assert_eq!(recorder.outputs(), vec![1]);
    assert_eq!(recorder.evictions(), vec![(2, 3)]);
    assert_eq!(recorder.events().last(), Some(&SequenceEvent::Flush));

    recorder.clear();
    assert!(recorder.events().is_empty());
}

#[test]
fn test_perfect_network_keeps_order() {
    let mut net = NetworkSimulator::perfect().with_seed(1);
    let schedule = net.schedule(SeqNo(65530), 12);

    assert!(schedule.lost.is_empty());
    let expected: Vec<SeqNo> = (0..12).map(|i| SeqNo(65530).wrapping_add(i)).collect();
    assert_eq!(schedule.order(), expected);
}

#[test]
fn test_lossy_schedule_is_reproducible() {
    let a = NetworkSimulator::stress_test().with_seed(42).schedule(SeqNo(0), 500);
    let b = NetworkSimulator::stress_test().with_seed(42).schedule(SeqNo(0), 500);

    assert_eq!(a.order(), b.order());
    assert_eq!(a.lost, b.lost);
    assert_eq!(a.arrivals.len() + a.lost.len(), 500);
}

#[test]
fn test_stress_schedule_reorders() {
    let schedule = NetworkSimulator::stress_test().with_seed(7).schedule(SeqNo(0), 500);
    let order = schedule.order();
    assert!(order.windows(2).any(|w| w[1].delta(w[0]) < 0));
}

#[test]
fn test_packet_interval() {
    assert_eq!(packet_interval().as_micros(), 7981);
}
