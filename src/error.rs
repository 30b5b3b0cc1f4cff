use std::io;
use thiserror::Error;

use crate::protocol::rtp::RtpDecodeError;

/// Errors surfaced by session setup, configuration and transport plumbing.
///
/// The sequencer itself never fails: loss, duplicates and desync are handled
/// by state transitions, not by errors.
#[derive(Debug, Error)]
pub enum RaopdError {
    /// Socket I/O error
    #[error("network error: {0}")]
    Io(#[from] io::Error),

    /// Malformed datagram
    #[error("RTP decode error: {0}")]
    Decode(#[from] RtpDecodeError),

    /// Configuration value out of range
    #[error("invalid config: {name} - {message}")]
    InvalidConfig {
        /// The name of the setting
        name: String,
        /// Description of the problem
        message: String,
    },

    /// Configuration document could not be parsed
    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// The sequencer worker has already shut down
    #[error("sequencer channel closed")]
    ChannelClosed,
}

impl RaopdError {
    /// Check if this error indicates the session is gone
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ChannelClosed)
    }
}

/// Result type alias for receiver operations
pub type Result<T> = std::result::Result<T, RaopdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RaopdError::InvalidConfig {
            name: "give_up_tick".to_string(),
            message: "must be positive".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid config: give_up_tick - must be positive"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::AddrInUse, "in use");
        let err: RaopdError = io_err.into();

        assert!(matches!(err, RaopdError::Io(_)));
        assert!(!err.is_closed());
    }

    #[test]
    fn test_error_from_decode() {
        let err: RaopdError = RtpDecodeError::InvalidVersion(1).into();
        assert_eq!(err.to_string(), "RTP decode error: invalid RTP version: 1");
    }

    #[test]
    fn test_channel_closed() {
        assert!(RaopdError::ChannelClosed.is_closed());
    }

    #[test]
    fn test_error_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RaopdError>();
    }
}
