//! Helpers for exercising the receive path without a real sender

#[cfg(feature = "tokio-runtime")]
pub mod mock_sender;
pub mod network_sim;
pub mod recording;

#[cfg(test)]
mod tests;

use crate::protocol::rtp::{PayloadType, RECOVERY_PREFIX_LEN, RtpHeader, STATUS_DECLINED, SeqNo};
use crate::receiver::arena::Packet;

/// SSRC used by generated packets
pub const TEST_SSRC: u32 = 0x5EED_CAFE;

/// Deterministic payload for a sequence number, so delivered packets can be
/// checked against what was sent
#[must_use]
pub fn audio_payload(seqno: SeqNo) -> Vec<u8> {
    let [hi, lo] = seqno.0.to_be_bytes();
    (0u8..32).map(|i| i ^ hi ^ lo.rotate_left(u32::from(i % 8))).collect()
}

/// A data channel audio datagram
#[must_use]
pub fn audio_datagram(seqno: SeqNo, payload: &[u8]) -> Vec<u8> {
    let timestamp = u32::from(seqno.0).wrapping_mul(352);
    let mut buf = RtpHeader::new_audio(seqno, timestamp, TEST_SSRC)
        .encode()
        .to_vec();
    buf.extend_from_slice(payload);
    buf
}

/// A control channel retransmit response wrapping an audio datagram
#[must_use]
pub fn recovery_datagram(seqno: SeqNo, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(RECOVERY_PREFIX_LEN + RtpHeader::SIZE + payload.len());
    buf.extend_from_slice(&[0x80, 0x80 | PayloadType::RetransmitResponse as u8, 0x00, 0x00]);
    buf.extend_from_slice(&audio_datagram(seqno, payload));
    buf
}

/// A control channel response declining to resend `seqno`
#[must_use]
pub fn declined_datagram(seqno: SeqNo) -> Vec<u8> {
    let mut buf = vec![0x80, 0x80 | PayloadType::RetransmitResponse as u8];
    buf.extend_from_slice(&STATUS_DECLINED.to_be_bytes());
    buf.extend_from_slice(&seqno.0.to_be_bytes());
    buf.extend_from_slice(&[0x00, 0x00]);
    buf
}

/// A control channel time sync datagram
#[must_use]
pub fn sync_datagram(rtp_timestamp: u32, ntp_timestamp: u64, next_timestamp: u32) -> Vec<u8> {
    let mut buf = vec![0x90, 0x80 | PayloadType::Sync as u8, 0x00, 0x07];
    buf.extend_from_slice(&rtp_timestamp.to_be_bytes());
    buf.extend_from_slice(&ntp_timestamp.to_be_bytes());
    buf.extend_from_slice(&next_timestamp.to_be_bytes());
    buf
}

/// A standalone packet as the transport would hand it to the sequencer
#[must_use]
pub fn test_packet(seqno: u16, retransmitted: bool) -> Packet {
    let seqno = SeqNo(seqno);
    Packet::from_bytes(
        seqno,
        &audio_datagram(seqno, &audio_payload(seqno)),
        retransmitted,
    )
}
