//! Failure classification: decides whether an executor error retries or
//! dead-letters.
//!
//! Classification is data, not code: the set of retryable I/O kinds lives in
//! [`Classifier`] and can be extended through configuration without touching
//! the worker. Explicit wrappers always win over the defaults.

use std::io;
use thiserror::Error;

/// The two ways an attempt can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Transition to FAILED; the scheduler will retry.
    Retryable,
    /// Transition to DLQ with the error as the reason.
    Terminal,
}

/// Error returned by a job executor.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Explicitly marked retryable; beats every other rule.
    #[error(transparent)]
    Retryable(anyhow::Error),

    /// Explicitly marked terminal; beats the default fallback.
    #[error(transparent)]
    Terminal(anyhow::Error),

    /// The execution was cancelled mid-flight.
    #[error("execution cancelled")]
    Cancelled,

    /// Unclassified; the classifier decides.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Wraps an error as explicitly retryable.
pub fn retryable(err: impl Into<anyhow::Error>) -> ExecutionError {
    ExecutionError::Retryable(err.into())
}

/// Wraps an error as explicitly terminal.
pub fn terminal(err: impl Into<anyhow::Error>) -> ExecutionError {
    ExecutionError::Terminal(err.into())
}

/// Classifies executor errors into retryable and terminal.
#[derive(Debug, Clone)]
pub struct Classifier {
    retryable_io_kinds: Vec<io::ErrorKind>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            retryable_io_kinds: vec![
                io::ErrorKind::ConnectionReset,
                io::ErrorKind::ConnectionRefused,
                io::ErrorKind::ConnectionAborted,
                io::ErrorKind::TimedOut,
                io::ErrorKind::HostUnreachable,
                io::ErrorKind::NetworkUnreachable,
                io::ErrorKind::NotConnected,
                io::ErrorKind::BrokenPipe,
            ],
        }
    }
}

impl Classifier {
    /// Creates a classifier with a custom retryable I/O kind set.
    pub fn new(retryable_io_kinds: Vec<io::ErrorKind>) -> Self {
        Self { retryable_io_kinds }
    }

    /// Adds an I/O kind to the retryable set.
    pub fn with_retryable_kind(mut self, kind: io::ErrorKind) -> Self {
        if !self.retryable_io_kinds.contains(&kind) {
            self.retryable_io_kinds.push(kind);
        }
        self
    }

    /// Classifies an execution error.
    ///
    /// Precedence: explicit retryable wrap, explicit terminal wrap,
    /// cancellation and elapsed timeouts, retryable I/O kinds anywhere in the
    /// cause chain, then the terminal default.
    pub fn classify(&self, err: &ExecutionError) -> FailureClass {
        match err {
            ExecutionError::Retryable(_) => FailureClass::Retryable,
            ExecutionError::Terminal(_) => FailureClass::Terminal,
            ExecutionError::Cancelled => FailureClass::Retryable,
            ExecutionError::Other(cause) => {
                for err in cause.chain() {
                    if let Some(io_err) = err.downcast_ref::<io::Error>() {
                        if self.retryable_io_kinds.contains(&io_err.kind()) {
                            return FailureClass::Retryable;
                        }
                    }
                    if err.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
                        return FailureClass::Retryable;
                    }
                }
                FailureClass::Terminal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_explicit_retryable_wins() {
        let c = Classifier::default();
        let err = retryable(anyhow!("validation failed"));
        assert_eq!(c.classify(&err), FailureClass::Retryable);
    }

    #[test]
    fn test_explicit_terminal_wins_over_network_cause() {
        let c = Classifier::default();
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        let err = terminal(io_err);
        assert_eq!(c.classify(&err), FailureClass::Terminal);
    }

    #[test]
    fn test_cancellation_is_retryable() {
        let c = Classifier::default();
        assert_eq!(c.classify(&ExecutionError::Cancelled), FailureClass::Retryable);
    }

    #[test]
    fn test_network_io_kinds_are_retryable() {
        let c = Classifier::default();
        for kind in [
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::ConnectionRefused,
            io::ErrorKind::TimedOut,
            io::ErrorKind::HostUnreachable,
            io::ErrorKind::NetworkUnreachable,
        ] {
            let err = ExecutionError::Other(anyhow::Error::new(io::Error::new(kind, "net")));
            assert_eq!(c.classify(&err), FailureClass::Retryable, "{:?}", kind);
        }
    }

    #[test]
    fn test_io_kind_deep_in_chain_is_found() {
        let c = Classifier::default();
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let wrapped = anyhow::Error::new(io_err).context("dialing upstream");
        let err = ExecutionError::Other(wrapped);
        assert_eq!(c.classify(&err), FailureClass::Retryable);
    }

    #[test]
    fn test_unrecognized_error_defaults_terminal() {
        let c = Classifier::default();
        let err = ExecutionError::Other(anyhow!("schema mismatch"));
        assert_eq!(c.classify(&err), FailureClass::Terminal);
    }

    #[test]
    fn test_non_retryable_io_kind_is_terminal() {
        let c = Classifier::default();
        let err = ExecutionError::Other(anyhow::Error::new(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "denied",
        )));
        assert_eq!(c.classify(&err), FailureClass::Terminal);
    }

    #[test]
    fn test_configured_extra_kind() {
        let c = Classifier::default().with_retryable_kind(io::ErrorKind::WouldBlock);
        let err = ExecutionError::Other(anyhow::Error::new(io::Error::new(
            io::ErrorKind::WouldBlock,
            "busy",
        )));
        assert_eq!(c.classify(&err), FailureClass::Retryable);
    }

    #[tokio::test]
    async fn test_elapsed_timeout_is_retryable() {
        let c = Classifier::default();
        let elapsed = tokio::time::timeout(
            std::time::Duration::from_millis(1),
            std::future::pending::<()>(),
        )
        .await
        .unwrap_err();
        let err = ExecutionError::Other(anyhow::Error::new(elapsed));
        assert_eq!(c.classify(&err), FailureClass::Retryable);
    }
}
