//! Control port receiver and rerequest transmitter
//!
//! Inbound: sync packets are ignored, retransmit responses are unwrapped and
//! fed to the sequencer as recovered packets, and a declined retransmission
//! flushes the sequencer. Outbound: rerequests from the sequencer are stamped
//! with a local counter and sent to the sender's control port.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::protocol::rtp::{ControlPacket, RECOVERY_PREFIX_LEN, RetransmitRequest};
use crate::receiver::arena::{Packet, PacketArena};
use crate::receiver::rtp_receiver::{Dispatch, forward};
use crate::receiver::sequencer_task::SequencerCommand;

/// Classify a datagram from the control channel
#[must_use]
pub fn dispatch_control(mut packet: Packet) -> Dispatch {
    match ControlPacket::decode(packet.content()) {
        Ok(ControlPacket::Sync { rtp_timestamp, .. }) => {
            tracing::trace!("Sync packet ignored, rtp_timestamp={}", rtp_timestamp);
            Dispatch::Discard
        }
        Ok(ControlPacket::RetransmitRequest(request)) => {
            tracing::debug!(
                "A retransmit request should not be received here: {:?}",
                request
            );
            Dispatch::Discard
        }
        Ok(ControlPacket::Recovered { status, seqno }) => {
            tracing::debug!("Recovery packet, status={}, seqno={}", status, seqno);
            packet.strip_prefix(RECOVERY_PREFIX_LEN);
            packet.set_seqno(seqno);
            packet.set_retransmitted(true);
            Dispatch::Sequence(packet)
        }
        Ok(ControlPacket::Declined { seqno }) => {
            // Nothing tracks which rerequests are outstanding, so start over
            tracing::debug!("Sender will not resend {}, flushing", seqno);
            Dispatch::Flush
        }
        Err(e) => {
            tracing::debug!("Control packet ignored: {}", e);
            Dispatch::Discard
        }
    }
}

/// Control port receiver
pub struct ControlReceiver {
    socket: Arc<UdpSocket>,
    arena: PacketArena,
    commands: mpsc::Sender<SequencerCommand>,
    peer: Option<watch::Sender<Option<SocketAddr>>>,
    shutdown: CancellationToken,
}

impl ControlReceiver {
    /// Create a new control receiver
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
            peer: None,
            shutdown,
        }
    }

    /// Publish the source address of control packets so rerequests can be
    /// sent back to it
    #[must_use]
    pub fn learn_peer(mut self, peer: watch::Sender<Option<SocketAddr>>) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Run the receive loop until shutdown or the sequencer stops
    ///
    /// # Errors
    /// Returns `std::io::Error` if socket access fails.
    pub async fn run(self) -> Result<(), io::Error> {
        loop {
            let mut packet = self.arena.acquire();

            let (len, src) = tokio::select! {
                () = self.shutdown.cancelled() => break,
                received = self.socket.recv_from(packet.recv_buf()) => received?,
            };
            packet.set_len(len);

            if let Some(peer) = &self.peer {
                peer.send_if_modified(|current| {
                    if *current == Some(src) {
                        false
                    } else {
                        tracing::debug!("Control peer is {}", src);
                        *current = Some(src);
                        true
                    }
                });
            }

            if !forward(&self.commands, dispatch_control(packet)).await {
                tracing::debug!("Sequencer gone, stopping control receiver");
                break;
            }
        }

        Ok(())
    }
}

/// Destination for encoded rerequests
#[async_trait]
pub trait RerequestSink: Send + Sync {
    /// Send one encoded rerequest
    async fn send_rerequest(&self, datagram: &[u8]) -> io::Result<()>;
}

/// Sends rerequests from the control socket to the sender's control port
pub struct UdpRerequestSink {
    socket: Arc<UdpSocket>,
    peer: watch::Receiver<Option<SocketAddr>>,
}

impl UdpRerequestSink {
    /// Create a sink sending to whatever address `peer` currently holds
    #[must_use]
    pub fn new(socket: Arc<UdpSocket>, peer: watch::Receiver<Option<SocketAddr>>) -> Self {
        Self { socket, peer }
    }
}

#[async_trait]
impl RerequestSink for UdpRerequestSink {
    async fn send_rerequest(&self, datagram: &[u8]) -> io::Result<()> {
        let peer = *self.peer.borrow();
        match peer {
            Some(addr) => {
                self.socket.send_to(datagram, addr).await?;
                Ok(())
            }
            None => {
                tracing::debug!("No control peer known yet, rerequest dropped");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl RerequestSink for mpsc::UnboundedSender<Bytes> {
    async fn send_rerequest(&self, datagram: &[u8]) -> io::Result<()> {
        self.send(Bytes::copy_from_slice(datagram))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "rerequest receiver dropped"))
    }
}

/// Encodes rerequests and sends them through a [`RerequestSink`]
pub struct RerequestTransmitter<S> {
    sink: S,
    requests: mpsc::Receiver<RetransmitRequest>,
    tx_seq: u16,
}

impl<S: RerequestSink> RerequestTransmitter<S> {
    /// Create a transmitter draining `requests`
    #[must_use]
    pub fn new(sink: S, requests: mpsc::Receiver<RetransmitRequest>) -> Self {
        Self {
            sink,
            requests,
            tx_seq: 1,
        }
    }

    /// Send rerequests until every request sender is dropped
    pub async fn run(mut self) {
        while let Some(request) = self.requests.recv().await {
            let datagram = request.encode(self.tx_seq);
            self.tx_seq = self.tx_seq.wrapping_add(1);

            match self.sink.send_rerequest(&datagram).await {
                Ok(()) => tracing::debug!(
                    "Recovery request {}..{} sent",
                    request.first,
                    request.last()
                ),
                Err(e) => tracing::warn!("Failed to send rerequest: {}", e),
            }
        }
    }
}
