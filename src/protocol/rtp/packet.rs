use thiserror::Error;

use super::seqno::SeqNo;

/// RTP payload types seen on the RAOP data, control and timing channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PayloadType {
    /// Timing request
    TimingRequest = 0x52,
    /// Timing response
    TimingResponse = 0x53,
    /// Time sync from the sender (control channel)
    Sync = 0x54,
    /// Retransmit request (receiver to sender)
    RetransmitRequest = 0x55,
    /// Retransmit response carrying a recovered packet
    RetransmitResponse = 0x56,
    /// Realtime audio data (data channel)
    Audio = 0x60,
}

impl PayloadType {
    /// Parse from the second header byte, ignoring the marker bit
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x7F {
            0x52 => Some(Self::TimingRequest),
            0x53 => Some(Self::TimingResponse),
            0x54 => Some(Self::Sync),
            0x55 => Some(Self::RetransmitRequest),
            0x56 => Some(Self::RetransmitResponse),
            0x60 => Some(Self::Audio),
            _ => None,
        }
    }
}

/// RTP header (12 bytes)
#[derive(Debug, Clone)]
pub struct RtpHeader {
    /// Marker bit
    pub marker: bool,
    /// Payload type (7 bits)
    pub payload_type: PayloadType,
    /// Sequence number
    pub sequence: SeqNo,
    /// Timestamp
    pub timestamp: u32,
    /// Synchronization source ID
    pub ssrc: u32,
}

impl RtpHeader {
    /// Standard RTP header size
    pub const SIZE: usize = 12;

    /// Create an audio packet header
    #[must_use]
    pub fn new_audio(sequence: SeqNo, timestamp: u32, ssrc: u32) -> Self {
        Self {
            marker: false,
            payload_type: PayloadType::Audio,
            sequence,
            timestamp,
            ssrc,
        }
    }

    /// Encode header to bytes
    #[must_use]
    pub fn encode(&self) -> [u8; 12] {
        let mut buf = [0u8; 12];

        // V=2, no padding, no extension, no CSRCs
        buf[0] = 0x80;
        buf[1] = (u8::from(self.marker) << 7) | (self.payload_type as u8 & 0x7F);
        self.sequence.encode(&mut buf[2..4]);
        buf[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ssrc.to_be_bytes());

        buf
    }

    /// Decode header from bytes
    ///
    /// # Errors
    ///
    /// Returns `RtpDecodeError` if buffer is too small, the version is not 2
    /// or the payload type is not one RAOP uses.
    pub fn decode(buf: &[u8]) -> Result<Self, RtpDecodeError> {
        if buf.len() < Self::SIZE {
            return Err(RtpDecodeError::BufferTooSmall {
                needed: Self::SIZE,
                have: buf.len(),
            });
        }

        let version = (buf[0] >> 6) & 0x03;
        if version != 2 {
            return Err(RtpDecodeError::InvalidVersion(version));
        }

        let payload_type_byte = buf[1] & 0x7F;
        let payload_type = PayloadType::from_byte(payload_type_byte)
            .ok_or(RtpDecodeError::UnknownPayloadType(payload_type_byte))?;

        Ok(Self {
            marker: (buf[1] >> 7) & 0x01 != 0,
            payload_type,
            sequence: SeqNo::decode(&buf[2..4]),
            timestamp: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ssrc: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        })
    }
}

/// Raw payload type byte of a datagram (low 7 bits of byte 1)
#[must_use]
pub fn payload_type_byte(buf: &[u8]) -> Option<u8> {
    buf.get(1).map(|b| b & 0x7F)
}

/// RTP decode errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RtpDecodeError {
    /// Datagram shorter than the structure being read
    #[error("buffer too small: need {needed} bytes, have {have}")]
    BufferTooSmall {
        /// Bytes required
        needed: usize,
        /// Bytes available
        have: usize,
    },

    /// RTP version other than 2
    #[error("invalid RTP version: {0}")]
    InvalidVersion(u8),

    /// Payload type not used by RAOP on this channel
    #[error("unknown payload type: 0x{0:02x}")]
    UnknownPayloadType(u8),
}
