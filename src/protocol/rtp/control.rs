//! Control channel packets: retransmit requests and their replies

use bytes::{BufMut, Bytes, BytesMut};

use super::packet::{PayloadType, RtpDecodeError, RtpHeader};
use super::seqno::SeqNo;

/// Bytes preceding the embedded RTP packet in a retransmit response
pub const RECOVERY_PREFIX_LEN: usize = 4;

/// Status value a sender uses to decline a retransmission
pub const STATUS_DECLINED: u16 = 1;

/// Request to retransmit a run of lost audio packets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetransmitRequest {
    /// First missing sequence number
    pub first: SeqNo,
    /// Number of missing packets starting at `first`
    pub count: u16,
}

impl RetransmitRequest {
    /// Size of an encoded request
    pub const SIZE: usize = 8;

    /// Create a new retransmit request
    #[must_use]
    pub fn new(first: SeqNo, count: u16) -> Self {
        Self { first, count }
    }

    /// Last sequence number covered by the request
    #[must_use]
    pub fn last(&self) -> SeqNo {
        self.first.wrapping_add(self.count.saturating_sub(1))
    }

    /// Encode to the 8-byte wire form.
    ///
    /// `tx_seq` is the transmitter's own request counter, not an audio
    /// sequence number.
    #[must_use]
    pub fn encode(&self, tx_seq: u16) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);

        buf.put_u8(0x80);
        buf.put_u8(0x80 | PayloadType::RetransmitRequest as u8);
        buf.put_u16(tx_seq);
        buf.put_u16(self.first.0);
        buf.put_u16(self.count);

        buf.freeze()
    }

    /// Decode the 8-byte wire form, returning the transmitter counter and the
    /// request
    ///
    /// # Errors
    ///
    /// Returns `RtpDecodeError` if the buffer is short or is not a retransmit
    /// request.
    pub fn decode(buf: &[u8]) -> Result<(u16, Self), RtpDecodeError> {
        if buf.len() < Self::SIZE {
            return Err(RtpDecodeError::BufferTooSmall {
                needed: Self::SIZE,
                have: buf.len(),
            });
        }

        let payload_type = buf[1] & 0x7F;
        if payload_type != PayloadType::RetransmitRequest as u8 {
            return Err(RtpDecodeError::UnknownPayloadType(payload_type));
        }

        let tx_seq = u16::from_be_bytes([buf[2], buf[3]]);
        Ok((
            tx_seq,
            Self {
                first: SeqNo::decode(&buf[4..6]),
                count: u16::from_be_bytes([buf[6], buf[7]]),
            },
        ))
    }
}

/// Packets received on the control channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlPacket {
    /// Time sync from the sender
    Sync {
        /// RTP timestamp at the NTP time
        rtp_timestamp: u32,
        /// NTP time of the sync
        ntp_timestamp: u64,
        /// RTP timestamp of the next packet to be played
        next_timestamp: u32,
    },
    /// A retransmit request; senders never send these to a receiver
    RetransmitRequest(RetransmitRequest),
    /// Retransmit response carrying an audio packet at offset
    /// [`RECOVERY_PREFIX_LEN`]
    Recovered {
        /// Status field of the response
        status: u16,
        /// Sequence number of the embedded audio packet
        seqno: SeqNo,
    },
    /// Retransmit response in which the sender declines to resend
    Declined {
        /// Sequence number that will not be resent
        seqno: SeqNo,
    },
}

impl ControlPacket {
    /// Classify a control channel datagram
    ///
    /// # Errors
    ///
    /// Returns `RtpDecodeError` if the datagram is too short for its payload
    /// type or the payload type is not a control type.
    pub fn decode(buf: &[u8]) -> Result<Self, RtpDecodeError> {
        if buf.len() < RECOVERY_PREFIX_LEN {
            return Err(RtpDecodeError::BufferTooSmall {
                needed: RECOVERY_PREFIX_LEN,
                have: buf.len(),
            });
        }

        let payload_type = buf[1] & 0x7F;

        match PayloadType::from_byte(payload_type) {
            Some(PayloadType::Sync) => {
                ensure_len(buf, 20)?;
                Ok(ControlPacket::Sync {
                    rtp_timestamp: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
                    ntp_timestamp: u64::from_be_bytes([
                        buf[8], buf[9], buf[10], buf[11], buf[12], buf[13], buf[14], buf[15],
                    ]),
                    next_timestamp: u32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]),
                })
            }
            Some(PayloadType::RetransmitRequest) => {
                let (_, request) = RetransmitRequest::decode(buf)?;
                Ok(ControlPacket::RetransmitRequest(request))
            }
            Some(PayloadType::RetransmitResponse) => {
                // The status lives where the outer header keeps its seqno
                let status = u16::from_be_bytes([buf[2], buf[3]]);
                if status == STATUS_DECLINED {
                    ensure_len(buf, RECOVERY_PREFIX_LEN + 2)?;
                    return Ok(ControlPacket::Declined {
                        seqno: SeqNo::decode(&buf[4..6]),
                    });
                }

                ensure_len(buf, RECOVERY_PREFIX_LEN + RtpHeader::SIZE)?;
                Ok(ControlPacket::Recovered {
                    status,
                    seqno: SeqNo::decode(&buf[RECOVERY_PREFIX_LEN + 2..RECOVERY_PREFIX_LEN + 4]),
                })
            }
            _ => Err(RtpDecodeError::UnknownPayloadType(payload_type)),
        }
    }
}

fn ensure_len(buf: &[u8], needed: usize) -> Result<(), RtpDecodeError> {
    if buf.len() < needed {
        Err(RtpDecodeError::BufferTooSmall {
            needed,
            have: buf.len(),
        })
    } else {
        Ok(())
    }
}
