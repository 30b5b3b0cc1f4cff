//! Mock RAOP sender for testing the receive path
//!
//! Streams audio datagrams at a receiver's data port, keeps what it sent so
//! rerequests arriving on its control socket can be answered, and can
//! "lose" packets by recording them without sending.

use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;

use super::{audio_datagram, audio_payload, declined_datagram, recovery_datagram, sync_datagram};
use crate::protocol::rtp::constants::{FRAMES_PER_PACKET, MAX_PACKET_SIZE};
use crate::protocol::rtp::{ControlPacket, RetransmitRequest, RtpDecodeError, SeqNo};
use crate::receiver::session::RtpPorts;

/// Packets remembered for retransmission
const HISTORY_LEN: usize = 1024;

/// Mock sender
pub struct MockSender {
    audio_socket: UdpSocket,
    control_socket: UdpSocket,
    data_addr: SocketAddr,
    control_addr: SocketAddr,
    sequence: SeqNo,
    history: VecDeque<(SeqNo, Vec<u8>)>,
}

impl MockSender {
    /// Bind sender sockets next to a receiver at `receiver_ip`
    ///
    /// # Errors
    /// Returns `MockSenderError::Io` if a socket cannot be bound.
    pub async fn bind(
        receiver_ip: IpAddr,
        ports: RtpPorts,
        first: SeqNo,
    ) -> Result<Self, MockSenderError> {
        let audio_socket = UdpSocket::bind(SocketAddr::new(receiver_ip, 0)).await?;
        let control_socket = UdpSocket::bind(SocketAddr::new(receiver_ip, 0)).await?;

        Ok(Self {
            audio_socket,
            control_socket,
            data_addr: SocketAddr::new(receiver_ip, ports.data),
            control_addr: SocketAddr::new(receiver_ip, ports.control),
            sequence: first,
            history: VecDeque::with_capacity(HISTORY_LEN),
        })
    }

    /// Address rerequests should be sent to
    ///
    /// # Errors
    /// Returns `MockSenderError::Io` if the socket has no local address.
    pub fn control_addr(&self) -> Result<SocketAddr, MockSenderError> {
        Ok(self.control_socket.local_addr()?)
    }

    /// Sequence number the next packet will carry
    #[must_use]
    pub fn next_seqno(&self) -> SeqNo {
        self.sequence
    }

    /// Send the next audio packet
    ///
    /// # Errors
    /// Returns `MockSenderError` if send fails.
    pub async fn send_audio(&mut self) -> Result<SeqNo, MockSenderError> {
        let seqno = self.advance();
        let datagram = audio_datagram(seqno, &audio_payload(seqno));
        self.audio_socket.send_to(&datagram, self.data_addr).await?;
        Ok(seqno)
    }

    /// Consume the next sequence number without sending it, as if the network
    /// dropped it
    pub fn skip(&mut self) -> SeqNo {
        self.advance()
    }

    /// Send a sync packet from the control socket, which also tells the
    /// receiver where rerequests should go
    ///
    /// # Errors
    /// Returns `MockSenderError` if send fails.
    #[allow(clippy::cast_possible_truncation)]
    pub async fn send_sync(&self) -> Result<(), MockSenderError> {
        let timestamp = u32::from(self.sequence.0).wrapping_mul(FRAMES_PER_PACKET as u32);
        let datagram = sync_datagram(timestamp, 0, timestamp);
        self.control_socket
            .send_to(&datagram, self.control_addr)
            .await?;
        Ok(())
    }

    /// Wait up to `wait` for a rerequest.
    ///
    /// Returns the receiver's transmit counter with the request, or `None`
    /// on timeout.
    ///
    /// # Errors
    /// Returns `MockSenderError` if the socket fails or a malformed datagram
    /// arrives.
    pub async fn recv_rerequest(
        &self,
        wait: Duration,
    ) -> Result<Option<(u16, RetransmitRequest)>, MockSenderError> {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        let Ok(received) = tokio::time::timeout(wait, self.control_socket.recv_from(&mut buf)).await
        else {
            return Ok(None);
        };
        let (len, _) = received?;

        match ControlPacket::decode(&buf[..len])? {
            ControlPacket::RetransmitRequest(_) => {
                Ok(Some(RetransmitRequest::decode(&buf[..len])?))
            }
            _ => Err(MockSenderError::Unexpected),
        }
    }

    /// Resend every packet of `request` still in the history.
    ///
    /// Returns how many were resent.
    ///
    /// # Errors
    /// Returns `MockSenderError` if send fails.
    pub async fn answer(&self, request: &RetransmitRequest) -> Result<usize, MockSenderError> {
        let mut resent = 0;
        for i in 0..request.count {
            let seqno = request.first.wrapping_add(i);
            if let Some((_, payload)) = self.history.iter().find(|(s, _)| *s == seqno) {
                self.control_socket
                    .send_to(&recovery_datagram(seqno, payload), self.control_addr)
                    .await?;
                resent += 1;
            }
        }
        Ok(resent)
    }

    /// Refuse to resend `seqno`
    ///
    /// # Errors
    /// Returns `MockSenderError` if send fails.
    pub async fn decline(&self, seqno: SeqNo) -> Result<(), MockSenderError> {
        self.control_socket
            .send_to(&declined_datagram(seqno), self.control_addr)
            .await?;
        Ok(())
    }

    fn advance(&mut self) -> SeqNo {
        let seqno = self.sequence;
        self.sequence = seqno.next();

        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back((seqno, audio_payload(seqno)));
        seqno
    }
}

/// Errors from mock sender
#[derive(Debug, thiserror::Error)]
pub enum MockSenderError {
    /// Something other than a rerequest arrived on the control socket
    #[error("Unexpected control packet")]
    Unexpected,

    /// Malformed datagram
    #[error("Decode error: {0}")]
    Decode(#[from] RtpDecodeError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
