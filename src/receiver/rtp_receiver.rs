//! RTP receive loops for the data and timing channels
//!
//! Datagrams are read straight into arena packets and classified by
//! [`dispatch_data`]; audio goes to the sequencer task, anything else is
//! released.

use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::rtp::{PayloadType, RtpHeader, SeqNo};
use crate::receiver::arena::{Packet, PacketArena};
use crate::receiver::sequencer_task::SequencerCommand;

/// Where a classified datagram goes
#[derive(Debug)]
pub enum Dispatch {
    /// Feed to the sequencer
    Sequence(Packet),
    /// Reset the sequencer
    Flush,
    /// Nothing to do; the packet is released
    Discard,
}

/// Classify a datagram from the data channel
#[must_use]
pub fn dispatch_data(mut packet: Packet) -> Dispatch {
    if packet.len() < RtpHeader::SIZE {
        tracing::debug!("Data packet too short: {} bytes", packet.len());
        return Dispatch::Discard;
    }

    match packet.payload_type() {
        Some(pt) if pt == PayloadType::Audio as u8 => {
            let seqno = SeqNo::decode(&packet.content()[2..4]);
            packet.set_seqno(seqno);
            packet.set_retransmitted(false);
            Dispatch::Sequence(packet)
        }
        other => {
            tracing::debug!("Data channel: unknown payload type {:?}", other);
            Dispatch::Discard
        }
    }
}

/// Hand a dispatch decision to the sequencer task.
///
/// Returns `false` once the task has gone away.
pub(crate) async fn forward(commands: &mpsc::Sender<SequencerCommand>, dispatch: Dispatch) -> bool {
    let command = match dispatch {
        Dispatch::Sequence(packet) => SequencerCommand::Packet(packet),
        Dispatch::Flush => SequencerCommand::Flush,
        Dispatch::Discard => return true,
    };
    commands.send(command).await.is_ok()
}

/// RTP audio data receiver
pub struct RtpDataReceiver {
    socket: Arc<UdpSocket>,
    arena: PacketArena,
    commands: mpsc::Sender<SequencerCommand>,
    shutdown: CancellationToken,
}

impl RtpDataReceiver {
    /// Create a new data receiver
    #[must_use]
    pub fn new(
        socket: Arc<UdpSocket>,
        arena: PacketArena,
        commands: mpsc::Sender<SequencerCommand>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            socket,
            arena,
            commands,
            shutdown,
        }
    }

    /// Run the receive loop until shutdown or the sequencer stops
    ///
    /// # Errors
    /// Returns `std::io::Error` if socket access fails.
    pub async fn run(self) -> Result<(), std::io::Error> {
        loop {
            let mut packet = self.arena.acquire();

            let len = tokio::select! {
                () = self.shutdown.cancelled() => break,
                received = self.socket.recv_from(packet.recv_buf()) => received?.0,
            };
            packet.set_len(len);

            if !forward(&self.commands, dispatch_data(packet)).await {
                tracing::debug!("Sequencer gone, stopping data receiver");
                break;
            }
        }

        Ok(())
    }
}

/// Timing channel receiver. Time sync is handled elsewhere, so every
/// datagram is read and released.
pub struct RtpTimingReceiver {
    socket: Arc<UdpSocket>,
    arena: PacketArena,
    shutdown: CancellationToken,
}

impl RtpTimingReceiver {
    /// Create a new timing receiver
    #[must_use]
    pub fn new(socket: Arc<UdpSocket>, arena: PacketArena, shutdown: CancellationToken) -> Self {
        Self {
            socket,
            arena,
            shutdown,
        }
    }

    /// Run the receive loop until shutdown
    ///
    /// # Errors
    /// Returns `std::io::Error` if socket access fails.
    pub async fn run(self) -> Result<(), std::io::Error> {
        loop {
            let mut packet = self.arena.acquire();

            let (len, src) = tokio::select! {
                () = self.shutdown.cancelled() => break,
                received = self.socket.recv_from(packet.recv_buf()) => received?,
            };
            tracing::trace!("Timing packet ignored: {} bytes from {}", len, src);
        }

        Ok(())
    }
}
