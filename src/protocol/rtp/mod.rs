//! RTP/RAOP wire formats used by the receive path

mod control;
mod packet;
mod seqno;


pub use control::{ControlPacket, RECOVERY_PREFIX_LEN, RetransmitRequest, STATUS_DECLINED};
pub use packet::{PayloadType, RtpDecodeError, RtpHeader, payload_type_byte};
pub use seqno::{SEQNO_GUARD, SeqNo, delta};

/// RTP protocol constants for RAOP
pub mod constants {
    /// Largest datagram accepted on any RTP channel
    pub const MAX_PACKET_SIZE: usize = 1800;

    /// Audio frames per RTP packet (352 samples at 44.1kHz ≈ 8ms)
    pub const FRAMES_PER_PACKET: usize = 352;

    /// Audio sample rate
    pub const SAMPLE_RATE: u32 = 44100;
}
