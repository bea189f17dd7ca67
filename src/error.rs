//! Error types for the sweep pipeline

use std::time::Duration;

use thiserror::Error;

/// Everything that can stop the pipeline
#[derive(Debug, Error)]
pub enum SweepError {
    /// The producer emitted a record we can't trust. Fatal.
    #[error("malformed sweep line ({reason}): {line:?}")]
    MalformedLine { line: String, reason: String },
    #[error("failed to launch sweep producer `{binary}`")]
    ProducerLaunch {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("sweep producer closed its output")]
    ProducerExited,
    #[error("sweep producer silent for {0:?}")]
    ProducerStalled(Duration),
    #[error("publish transport unavailable at {addr}")]
    TransportUnavailable {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("driver already terminated")]
    AlreadyTerminated,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SweepError {
    pub(crate) fn malformed(line: &str, reason: impl Into<String>) -> Self {
        Self::MalformedLine {
            line: line.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Failure to hand a cycle to subscribers. Logged, never fatal.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish backlog full, dropped cycle {0}")]
    Backlogged(u64),
    #[error("exchange is closed")]
    Closed,
}
