//! Error taxonomy for the analysis session and the history store.
//!
//! [`SessionError`] is what the user sees: each variant has a stable
//! [`code`](SessionError::code). [`StoreError`] never reaches the user; the
//! history store logs it and recovers locally.

use thiserror::Error;

/// Message shown when the analysis client fails without a description.
pub const GENERIC_ANALYSIS_FAILURE: &str =
    "Failed to analyze the transcript. Please check the text and try again.";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Transcript text must not be empty")]
    EmptyInput,

    #[error("Transcript is too short to analyze: {len} characters (minimum {min})")]
    TooShort { len: usize, min: usize },

    #[error("Transcript is too long to analyze: {len} characters (maximum {max})")]
    TooLong { len: usize, max: usize },

    #[error("{0}")]
    AnalysisFailed(String),

    /// A submission arrived while an analysis is in flight.
    #[error("An analysis is already in progress")]
    Busy,

    #[error("Cannot {action} while the session is {status}")]
    InvalidTransition {
        action: &'static str,
        status: &'static str,
    },
}

impl SessionError {
    /// Stable machine-readable identifier.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyInput => "empty-input",
            Self::TooShort { .. } => "too-short",
            Self::TooLong { .. } => "too-long",
            Self::AnalysisFailed(_) => "analysis-failed",
            Self::Busy => "busy",
            Self::InvalidTransition { .. } => "invalid-transition",
        }
    }

    /// Wrap a client failure, falling back to the generic message when the
    /// client gave no description.
    pub fn analysis_failed(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            Self::AnalysisFailed(GENERIC_ANALYSIS_FAILURE.to_string())
        } else {
            Self::AnalysisFailed(message)
        }
    }

    /// Whether this error is held as the session's error state, as opposed
    /// to rejecting the call without touching state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Busy | Self::InvalidTransition { .. })
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    /// Persisted history could not be read back.
    #[error("history-corrupt: {0}")]
    HistoryCorrupt(String),

    /// Writing to durable storage failed.
    #[error("persist-failed: {0}")]
    PersistFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(SessionError::EmptyInput.code(), "empty-input");
        assert_eq!(SessionError::TooShort { len: 5, min: 50 }.code(), "too-short");
        assert_eq!(SessionError::TooLong { len: 9, max: 1 }.code(), "too-long");
        assert_eq!(
            SessionError::AnalysisFailed("x".into()).code(),
            "analysis-failed"
        );
    }

    #[test]
    fn blank_failure_uses_generic_message() {
        let err = SessionError::analysis_failed("  ");
        assert_eq!(err.to_string(), GENERIC_ANALYSIS_FAILURE);

        let err = SessionError::analysis_failed("Ollama API error 500");
        assert_eq!(err.to_string(), "Ollama API error 500");
    }

    #[test]
    fn rejections_are_not_terminal() {
        assert!(!SessionError::Busy.is_terminal());
        assert!(SessionError::EmptyInput.is_terminal());
    }
}
