//! Failure taxonomy for per-item pipeline errors.
//!
//! The orchestrator matches on this enum to decide whether an item goes
//! back through the retry ledger or fails immediately with an alert.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Network or timeout failure on an outbound call. Retryable.
    #[error("transient I/O failure: {message}")]
    TransientIo { message: String },

    /// ASR or diarization engine failure. Retryable; may trigger the
    /// fallback engine first.
    #[error("engine failure ({engine}): {message}")]
    EngineFailure { engine: String, message: String },

    /// Missing required input, e.g. an entry with no source link.
    /// Never retried.
    #[error("validation failure: {message}")]
    Validation { message: String },

    /// The contractual delivery destination rejected every file.
    /// Retryable.
    #[error("delivery incomplete: {message}")]
    DeliveryIncomplete { message: String },
}

impl PipelineError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientIo {
            message: message.into(),
        }
    }

    pub fn engine(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EngineFailure {
            engine: engine.into(),
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn delivery(message: impl Into<String>) -> Self {
        Self::DeliveryIncomplete {
            message: message.into(),
        }
    }

    /// Whether the retry ledger should see this failure at all.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Validation { .. })
    }

    /// Short label used as the recorded failure reason.
    pub fn reason(&self) -> String {
        match self {
            Self::TransientIo { message } => format!("Transient I/O: {message}"),
            Self::EngineFailure { engine, message } => {
                format!("{engine} engine: {message}")
            }
            Self::Validation { message } => format!("Validation: {message}"),
            Self::DeliveryIncomplete { message } => format!("Delivery: {message}"),
        }
    }
}
