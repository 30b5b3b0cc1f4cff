//! Receive path for RAOP audio
//!
//! Datagrams from the data and control channels are classified, reordered
//! by the [`sequencer::Sequencer`] and delivered in sequence order. Gaps are
//! recovered with escalating rerequests on the control channel.

pub mod arena;
pub mod config;
pub mod sequence_log;
pub mod sequencer;

#[cfg(feature = "tokio-runtime")]
pub mod control_receiver;
#[cfg(feature = "tokio-runtime")]
pub mod rtp_receiver;
#[cfg(feature = "tokio-runtime")]
pub mod sequencer_task;
#[cfg(feature = "tokio-runtime")]
pub mod session;

#[cfg(test)]
mod tests;

pub use arena::{ArenaStats, Packet, PacketArena};
pub use config::{SequencerConfig, SessionConfig};
pub use sequence_log::{Disposition, NoopObserver, SequenceObserver, TracingObserver};
pub use sequencer::{Sequencer, SequencerStats};

#[cfg(feature = "tokio-runtime")]
pub use sequencer_task::{SequencerCommand, SequencerHandle};
#[cfg(feature = "tokio-runtime")]
pub use session::{RtpPorts, RtpSession};
