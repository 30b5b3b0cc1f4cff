//! Network condition simulation for testing

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

use crate::protocol::rtp::SeqNo;
use crate::protocol::rtp::constants::{FRAMES_PER_PACKET, SAMPLE_RATE};

/// Network condition simulator
#[derive(Clone, Debug)]
pub struct NetworkSimulator {
    /// Packet loss probability (0.0 to 1.0)
    pub loss_rate: f64,
    /// Jitter range (max delay added)
    pub jitter_ms: u32,
    /// Base delay added to all packets
    pub delay_ms: u32,
    /// Probability of reordering
    pub reorder_rate: f64,
    rng: StdRng,
}

/// Arrival order produced by [`NetworkSimulator::schedule`]
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    /// Packets that made it, ordered by arrival time
    pub arrivals: Vec<(Duration, SeqNo)>,
    /// Packets dropped by the network
    pub lost: Vec<SeqNo>,
}

impl Schedule {
    /// Sequence numbers in arrival order
    #[must_use]
    pub fn order(&self) -> Vec<SeqNo> {
        self.arrivals.iter().map(|(_, seqno)| *seqno).collect()
    }
}

impl NetworkSimulator {
    fn with_conditions(loss_rate: f64, jitter_ms: u32, delay_ms: u32, reorder_rate: f64) -> Self {
        Self {
            loss_rate,
            jitter_ms,
            delay_ms,
            reorder_rate,
            rng: StdRng::from_entropy(),
        }
    }

    /// Perfect network (no issues)
    #[must_use]
    pub fn perfect() -> Self {
        Self::with_conditions(0.0, 0, 0, 0.0)
    }

    /// Good `WiFi` conditions
    #[must_use]
    pub fn good_wifi() -> Self {
        Self::with_conditions(0.001, 5, 2, 0.001)
    }

    /// Moderate `WiFi` conditions
    #[must_use]
    pub fn moderate_wifi() -> Self {
        Self::with_conditions(0.01, 20, 10, 0.01)
    }

    /// Poor `WiFi` conditions
    #[must_use]
    pub fn poor_wifi() -> Self {
        Self::with_conditions(0.05, 50, 30, 0.05)
    }

    /// Very poor conditions (stress test)
    #[must_use]
    pub fn stress_test() -> Self {
        Self::with_conditions(0.10, 100, 50, 0.10)
    }

    /// Make every random decision reproducible
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Should this packet be dropped?
    #[must_use]
    pub fn should_drop(&mut self) -> bool {
        if self.loss_rate <= 0.0 {
            return false;
        }
        self.rng.gen_bool(self.loss_rate)
    }

    /// Get delay for this packet
    #[must_use]
    pub fn get_delay(&mut self) -> Duration {
        let jitter: u32 = if self.jitter_ms > 0 {
            self.rng.gen_range(0..self.jitter_ms)
        } else {
            0
        };

        Duration::from_millis(u64::from(self.delay_ms + jitter))
    }

    /// Should this packet be reordered?
    #[must_use]
    pub fn should_reorder(&mut self) -> bool {
        if self.reorder_rate <= 0.0 {
            return false;
        }
        self.rng.gen_bool(self.reorder_rate)
    }

    /// Run `count` packets starting at `first`, sent at the audio packet
    /// rate, through the simulated network
    #[must_use]
    pub fn schedule(&mut self, first: SeqNo, count: u16) -> Schedule {
        let interval = packet_interval();
        let mut schedule = Schedule::default();

        for i in 0..count {
            let seqno = first.wrapping_add(i);
            if self.should_drop() {
                schedule.lost.push(seqno);
                continue;
            }

            let mut at = interval * u32::from(i) + self.get_delay();
            if self.should_reorder() {
                // Held back behind a few of its successors
                at += interval * self.rng.gen_range(2..6);
            }
            schedule.arrivals.push((at, seqno));
        }

        schedule.arrivals.sort_by_key(|(at, _)| *at);
        schedule
    }
}

/// Time between audio packets at the nominal rate
#[must_use]
pub fn packet_interval() -> Duration {
    Duration::from_micros(FRAMES_PER_PACKET as u64 * 1_000_000 / u64::from(SAMPLE_RATE))
}
