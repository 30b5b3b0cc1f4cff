//! # raopd
//!
//! The receive-side core of an `AirPlay` (RAOP) audio receiver: it takes RTP
//! audio packets arriving out of order over UDP, puts them back in sequence,
//! asks the sender to retransmit what went missing and gives up on gaps that
//! cannot be recovered in time.
//!
//! RTSP, key exchange, decryption, ALAC decoding and service discovery live
//! outside this crate; the receive path hands in-order packets to a
//! caller-supplied callback.
//!
//! ## Example
//!
//! ```rust,no_run
//! use raopd::receiver::{RtpSession, SessionConfig};
//!
//! # async fn example() -> Result<(), raopd::RaopdError> {
//! let session = RtpSession::start(SessionConfig::default(), |packet| {
//!     // decrypt and decode packet.payload() here
//!     drop(packet);
//! })
//! .await?;
//!
//! let ports = session.ports();
//! println!("data={} control={} timing={}", ports.data, ports.control, ports.timing);
//!
//! session.teardown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Protocol**: sequence number arithmetic and the RTP/RAOP wire formats
//! - **Sequencer**: the reorder and recovery state machine
//! - **Session**: UDP receive loops and the sequencer task

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Error types
pub mod error;
pub mod protocol;
pub mod receiver;

/// Testing utilities
pub mod testing;

pub use error::{RaopdError, Result};
pub use protocol::rtp::{RetransmitRequest, SeqNo};
pub use receiver::{Packet, PacketArena, Sequencer, SequencerConfig, SequencerStats};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
