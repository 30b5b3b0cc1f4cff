//! Sequencer worker task
//!
//! One task owns the [`Sequencer`]. Receive loops feed it through a bounded
//! command queue; a recovery timer drives `tick` only while a gap is open.
//! All sequencer mutation happens on this task.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::{RaopdError, Result};
use crate::protocol::rtp::RetransmitRequest;
use crate::receiver::arena::Packet;
use crate::receiver::config::SequencerConfig;
use crate::receiver::sequence_log::SequenceObserver;
use crate::receiver::sequencer::{Sequencer, SequencerStats};

/// Commands accepted by the sequencer task
#[derive(Debug)]
pub enum SequencerCommand {
    /// A packet from the data or control channel
    Packet(Packet),
    /// Reset the sequencer
    Flush,
    /// Release everything and stop
    Close,
}

/// Handle to a running sequencer task
pub struct SequencerHandle {
    commands: mpsc::Sender<SequencerCommand>,
    stats: watch::Receiver<SequencerStats>,
    task: JoinHandle<SequencerStats>,
}

impl SequencerHandle {
    /// Start a task owning `sequencer`.
    ///
    /// In-order packets are passed to `deliver` on the task itself, and due
    /// rerequests are pushed to `rerequests`.
    #[must_use]
    pub fn spawn<O, D>(
        sequencer: Sequencer<O>,
        config: &SequencerConfig,
        deliver: D,
        rerequests: mpsc::Sender<RetransmitRequest>,
    ) -> Self
    where
        O: SequenceObserver + 'static,
        D: FnMut(Packet) + Send + 'static,
    {
        let (commands, command_rx) = mpsc::channel(config.queue_capacity);
        let (stats_tx, stats) = watch::channel(sequencer.stats());

        let task = tokio::spawn(run(
            sequencer,
            config.clone(),
            command_rx,
            deliver,
            rerequests,
            stats_tx,
        ));

        Self {
            commands,
            stats,
            task,
        }
    }

    /// A sender for receive loops to feed the task
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<SequencerCommand> {
        self.commands.clone()
    }

    /// Queue a packet, waiting if the queue is full
    ///
    /// # Errors
    /// Returns `RaopdError::ChannelClosed` if the task has stopped.
    pub async fn submit(&self, packet: Packet) -> Result<()> {
        self.commands
            .send(SequencerCommand::Packet(packet))
            .await
            .map_err(|_| RaopdError::ChannelClosed)
    }

    /// Queue a flush
    ///
    /// # Errors
    /// Returns `RaopdError::ChannelClosed` if the task has stopped.
    pub async fn flush(&self) -> Result<()> {
        self.commands
            .send(SequencerCommand::Flush)
            .await
            .map_err(|_| RaopdError::ChannelClosed)
    }

    /// Counters as of the last processed event
    #[must_use]
    pub fn stats(&self) -> SequencerStats {
        *self.stats.borrow()
    }

    /// Stop the task and wait for it, returning the final counters
    pub async fn close(self) -> SequencerStats {
        // The task may already be gone; the join below still reports
        let _ = self.commands.send(SequencerCommand::Close).await;

        match self.task.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!("Sequencer task failed: {}", e);
                *self.stats.borrow()
            }
        }
    }
}

async fn run<O, D>(
    mut sequencer: Sequencer<O>,
    config: SequencerConfig,
    mut commands: mpsc::Receiver<SequencerCommand>,
    mut deliver: D,
    rerequests: mpsc::Sender<RetransmitRequest>,
    stats_tx: watch::Sender<SequencerStats>,
) -> SequencerStats
where
    O: SequenceObserver,
    D: FnMut(Packet),
{
    let mut ticker = tokio::time::interval(config.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut recovering = false;

    loop {
        if sequencer.in_recovery() != recovering {
            recovering = !recovering;
            if recovering {
                // First tick one full period after the gap opened
                ticker.reset();
            }
        }

        tokio::select! {
            command = commands.recv() => match command {
                Some(SequencerCommand::Packet(packet)) => {
                    match sequencer.lead(packet.seqno()) {
                        Some(lead) if lead > config.max_lead && packet.is_retransmitted() => {
                            tracing::debug!(
                                "Retransmitted {} is {} ahead of expected, discarding",
                                packet.seqno(),
                                lead
                            );
                            sequencer.discard(packet);
                        }
                        Some(lead) if lead > config.max_lead => {
                            tracing::warn!(
                                "Sequence number {} is {} ahead of expected, flushing sequencer",
                                packet.seqno(),
                                lead
                            );
                            sequencer.flush();
                            sequencer.handle(packet, &mut deliver);
                        }
                        _ => sequencer.handle(packet, &mut deliver),
                    }
                }
                Some(SequencerCommand::Flush) => sequencer.flush(),
                Some(SequencerCommand::Close) | None => break,
            },
            _ = ticker.tick(), if recovering => {
                for request in sequencer.tick(&mut deliver) {
                    if rerequests.send(request).await.is_err() {
                        tracing::debug!("Rerequest channel closed, dropping {:?}", request);
                    }
                }
            }
        }

        stats_tx.send_replace(sequencer.stats());
    }

    sequencer.close();

    // Whatever is still queued goes straight back to the arena
    commands.close();
    while commands.try_recv().is_ok() {}

    let stats = sequencer.stats();
    stats_tx.send_replace(stats);
    tracing::debug!("Sequencer task stopped: {:?}", stats);
    stats
}
