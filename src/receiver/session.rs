//! RTP session: the three UDP channels wired to a sequencer task

use std::net::SocketAddr;
use std::sync::Arc;

use futures::future::join_all;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::protocol::rtp::constants::MAX_PACKET_SIZE;
use crate::receiver::arena::{Packet, PacketArena};
use crate::receiver::config::SessionConfig;
use crate::receiver::control_receiver::{
    ControlReceiver, RerequestTransmitter, UdpRerequestSink,
};
use crate::receiver::rtp_receiver::{RtpDataReceiver, RtpTimingReceiver};
use crate::receiver::sequence_log::{SequenceObserver, TracingObserver};
use crate::receiver::sequencer::{Sequencer, SequencerStats};
use crate::receiver::sequencer_task::SequencerHandle;

/// Local ports of a running session, for the SETUP response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpPorts {
    /// Audio data port
    pub data: u16,
    /// Control port
    pub control: u16,
    /// Timing port
    pub timing: u16,
}

/// A running RTP receive session
pub struct RtpSession {
    ports: RtpPorts,
    arena: PacketArena,
    sequencer: SequencerHandle,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl RtpSession {
    /// Bind the RTP sockets and start receiving.
    ///
    /// `deliver` is called on the sequencer task with each packet in sequence
    /// order; dropping the packet returns its buffer.
    ///
    /// # Errors
    /// Returns `RaopdError::InvalidConfig` for bad settings and
    /// `RaopdError::Io` if a socket cannot be bound.
    pub async fn start<D>(config: SessionConfig, deliver: D) -> Result<Self>
    where
        D: FnMut(Packet) + Send + 'static,
    {
        Self::start_with_observer(config, TracingObserver, deliver).await
    }

    /// Like [`RtpSession::start`], reporting sequencer events to `observer`
    ///
    /// # Errors
    /// Returns `RaopdError::InvalidConfig` for bad settings and
    /// `RaopdError::Io` if a socket cannot be bound.
    pub async fn start_with_observer<O, D>(
        config: SessionConfig,
        observer: O,
        deliver: D,
    ) -> Result<Self>
    where
        O: SequenceObserver + 'static,
        D: FnMut(Packet) + Send + 'static,
    {
        config.validate()?;

        let data = bind(&config, config.data_port).await?;
        let control = bind(&config, config.control_port).await?;
        let timing = bind(&config, config.timing_port).await?;

        let ports = RtpPorts {
            data: data.local_addr()?.port(),
            control: control.local_addr()?.port(),
            timing: timing.local_addr()?.port(),
        };

        let arena = PacketArena::with_capacity(MAX_PACKET_SIZE, config.arena_max_pooled);
        let (rerequest_tx, rerequest_rx) =
            mpsc::channel(config.sequencer.rerequest_queue_capacity);

        let sequencer = SequencerHandle::spawn(
            Sequencer::with_observer(&config.sequencer, observer),
            &config.sequencer,
            deliver,
            rerequest_tx,
        );

        let shutdown = CancellationToken::new();
        let (peer_tx, peer_rx) = watch::channel(config.control_peer);
        let mut tasks = Vec::with_capacity(4);

        let data_receiver = RtpDataReceiver::new(
            data,
            arena.clone(),
            sequencer.sender(),
            shutdown.clone(),
        );
        tasks.push(tokio::spawn(async move {
            if let Err(e) = data_receiver.run().await {
                tracing::error!("Data receiver error: {}", e);
            }
        }));

        let mut control_receiver = ControlReceiver::new(
            Arc::clone(&control),
            arena.clone(),
            sequencer.sender(),
            shutdown.clone(),
        );
        if config.control_peer.is_none() {
            control_receiver = control_receiver.learn_peer(peer_tx);
        }
        tasks.push(tokio::spawn(async move {
            if let Err(e) = control_receiver.run().await {
                tracing::error!("Control receiver error: {}", e);
            }
        }));

        let timing_receiver = RtpTimingReceiver::new(timing, arena.clone(), shutdown.clone());
        tasks.push(tokio::spawn(async move {
            if let Err(e) = timing_receiver.run().await {
                tracing::error!("Timing receiver error: {}", e);
            }
        }));

        let transmitter =
            RerequestTransmitter::new(UdpRerequestSink::new(control, peer_rx), rerequest_rx);
        tasks.push(tokio::spawn(transmitter.run()));

        tracing::info!(
            "RTP session started: data={}, control={}, timing={}",
            ports.data,
            ports.control,
            ports.timing
        );

        Ok(Self {
            ports,
            arena,
            sequencer,
            shutdown,
            tasks,
        })
    }

    /// Local ports
    #[must_use]
    pub fn ports(&self) -> RtpPorts {
        self.ports
    }

    /// The session's packet arena
    #[must_use]
    pub fn arena(&self) -> &PacketArena {
        &self.arena
    }

    /// Resynchronize, e.g. after an RTSP FLUSH
    ///
    /// # Errors
    /// Returns `RaopdError::ChannelClosed` if the sequencer has stopped.
    pub async fn flush(&self) -> Result<()> {
        self.sequencer.flush().await
    }

    /// Sequencer counters
    #[must_use]
    pub fn stats(&self) -> SequencerStats {
        self.sequencer.stats()
    }

    /// Stop every task, release held packets and close the sockets
    pub async fn teardown(self) -> SequencerStats {
        self.shutdown.cancel();
        let stats = self.sequencer.close().await;

        for result in join_all(self.tasks).await {
            if let Err(e) = result {
                tracing::warn!("RTP task ended abnormally: {}", e);
            }
        }

        tracing::info!("RTP session torn down: {:?}", stats);
        stats
    }
}

async fn bind(config: &SessionConfig, port: u16) -> Result<Arc<UdpSocket>> {
    let socket = UdpSocket::bind(SocketAddr::new(config.bind_addr, port)).await?;
    Ok(Arc::new(socket))
}
