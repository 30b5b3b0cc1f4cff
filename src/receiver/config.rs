//! Receive path configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RaopdError, Result};
use crate::receiver::arena::DEFAULT_MAX_POOLED;

/// Sequencer tuning.
///
/// Retry levels count recovery ticks since a sequence number was first seen
/// missing. At the default 10ms tick the rerequests go out at roughly 30ms,
/// 110ms and 230ms, and the gap is abandoned at roughly 370ms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Recovery tick period in milliseconds
    pub tick_interval_ms: u64,
    /// Retry levels at which a rerequest is sent, ascending
    pub rerequest_ticks: Vec<u32>,
    /// Retry level at which a gap is abandoned
    pub give_up_tick: u32,
    /// Lead over the expected sequence number beyond which the stream is
    /// treated as desynchronized and the sequencer is flushed
    pub max_lead: i32,
    /// Capacity of the inbound packet queue
    pub queue_capacity: usize,
    /// Capacity of the outbound rerequest queue
    pub rerequest_queue_capacity: usize,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 10,
            rerequest_ticks: vec![3, 11, 23],
            give_up_tick: 37,
            max_lead: 2000,
            queue_capacity: 256,
            rerequest_queue_capacity: 128,
        }
    }
}

impl SequencerConfig {
    /// Recovery tick period
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Set the tick period
    #[must_use]
    pub fn tick_interval_ms(mut self, ms: u64) -> Self {
        self.tick_interval_ms = ms;
        self
    }

    /// Set the retry ladder
    #[must_use]
    pub fn retry_ladder(mut self, rerequest_ticks: Vec<u32>, give_up_tick: u32) -> Self {
        self.rerequest_ticks = rerequest_ticks;
        self.give_up_tick = give_up_tick;
        self
    }

    /// Set the desync bound
    #[must_use]
    pub fn max_lead(mut self, max_lead: i32) -> Self {
        self.max_lead = max_lead;
        self
    }

    /// Check the values are usable
    ///
    /// # Errors
    /// Returns `RaopdError::InvalidConfig` naming the first bad setting.
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(invalid("tick_interval_ms", "must be positive"));
        }
        if self.give_up_tick == 0 {
            return Err(invalid("give_up_tick", "must be positive"));
        }
        if self.rerequest_ticks.windows(2).any(|w| w[0] >= w[1]) {
            return Err(invalid("rerequest_ticks", "must be strictly ascending"));
        }
        if self.rerequest_ticks.contains(&0) {
            return Err(invalid("rerequest_ticks", "levels start at 1"));
        }
        if self
            .rerequest_ticks
            .last()
            .is_some_and(|&last| last >= self.give_up_tick)
        {
            return Err(invalid("rerequest_ticks", "must all be below give_up_tick"));
        }
        if self.max_lead <= 0 {
            return Err(invalid("max_lead", "must be positive"));
        }
        if self.queue_capacity == 0 || self.rerequest_queue_capacity == 0 {
            return Err(invalid("queue_capacity", "queues need room for one item"));
        }
        Ok(())
    }
}

/// RTP session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Local address the RTP sockets bind to
    pub bind_addr: IpAddr,
    /// Audio data port (0 = auto-assign)
    pub data_port: u16,
    /// Control port (0 = auto-assign)
    pub control_port: u16,
    /// Timing port (0 = auto-assign)
    pub timing_port: u16,
    /// Sender control port to send rerequests to. When unset, rerequests go
    /// to wherever the last control packet came from.
    pub control_peer: Option<SocketAddr>,
    /// Idle buffers kept by the packet arena
    pub arena_max_pooled: usize,
    /// Sequencer tuning
    pub sequencer: SequencerConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            data_port: 0,
            control_port: 0,
            timing_port: 0,
            control_peer: None,
            arena_max_pooled: DEFAULT_MAX_POOLED,
            sequencer: SequencerConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Parse from a JSON document; missing fields take their defaults
    ///
    /// # Errors
    /// Returns `RaopdError::ConfigParse` on malformed JSON and
    /// `RaopdError::InvalidConfig` if a value is out of range.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the bind address
    #[must_use]
    pub fn bind_addr(mut self, addr: IpAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the sender's control port address
    #[must_use]
    pub fn control_peer(mut self, peer: SocketAddr) -> Self {
        self.control_peer = Some(peer);
        self
    }

    /// Set sequencer tuning
    #[must_use]
    pub fn sequencer(mut self, sequencer: SequencerConfig) -> Self {
        self.sequencer = sequencer;
        self
    }

    /// Check the values are usable
    ///
    /// # Errors
    /// Returns `RaopdError::InvalidConfig` naming the first bad setting.
    pub fn validate(&self) -> Result<()> {
        self.sequencer.validate()
    }
}

fn invalid(name: &str, message: &str) -> RaopdError {
    RaopdError::InvalidConfig {
        name: name.to_string(),
        message: message.to_string(),
    }
}
