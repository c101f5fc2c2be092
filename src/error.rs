//! Error taxonomy for the sieve core
//!
//! The sieve itself has no recoverable errors: every variant here is fatal
//! for the run it occurs in. They exist so a stalled or misbehaving worker
//! surfaces as a typed failure instead of a silent hang.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SieveError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{} timed out after {after_ms}ms waiting for {operation}", describe_rank(.rank))]
    Timeout {
        /// `None` for a worker still waiting for its rank
        rank: Option<usize>,
        operation: &'static str,
        after_ms: u64,
    },

    #[error("Rank {rank} lost its connection to {peer}")]
    Disconnected { rank: usize, peer: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error(
        "Coordinator has no candidate after {candidate} in its range ending at {range_end}; \
         its local view cannot elect the next sieving prime"
    )]
    ElectionExhausted { candidate: usize, range_end: usize },

    #[error("Transport error: {context}")]
    Transport {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Worker {rank} panicked")]
    WorkerPanicked { rank: usize },

    #[error("Failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

fn describe_rank(rank: &Option<usize>) -> String {
    match rank {
        Some(rank) => format!("Rank {}", rank),
        None => "Unassigned worker".to_string(),
    }
}

pub type SieveResult<T> = std::result::Result<T, SieveError>;

impl SieveError {
    pub fn transport(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Transport {
            context: context.into(),
            source,
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// True for errors a worker sees when some other worker stopped first
    pub fn is_peer_loss(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Disconnected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_operation() {
        let err = SieveError::Timeout {
            rank: Some(3),
            operation: "broadcast",
            after_ms: 250,
        };
        let msg = err.to_string();
        assert!(msg.contains("Rank 3"));
        assert!(msg.contains("broadcast"));
        assert!(msg.contains("250ms"));
    }

    #[test]
    fn test_transport_keeps_source() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = SieveError::transport("reading broadcast", io);
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "Transport error: reading broadcast");
    }

    #[test]
    fn test_peer_loss_classification() {
        assert!(SieveError::Disconnected { rank: 1, peer: "rank 0".into() }.is_peer_loss());
        let timeout = SieveError::Timeout { rank: Some(0), operation: "gather", after_ms: 1 };
        assert!(timeout.is_peer_loss());
        assert!(!SieveError::protocol("bad").is_peer_loss());
        assert!(!SieveError::ElectionExhausted { candidate: 7, range_end: 10 }.is_peer_loss());
    }

    #[test]
    fn test_timeout_before_rank_assignment() {
        let err = SieveError::Timeout {
            rank: None,
            operation: "handshake",
            after_ms: 100,
        };
        assert_eq!(
            err.to_string(),
            "Unassigned worker timed out after 100ms waiting for handshake"
        );
        assert!(err.is_peer_loss());
    }
}
