//! Error types shared by the port utilities and pure helpers.

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::types::PortState;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
///
/// Only `Validation`, `Environment`, `Exhausted`, `Timeout` and `Cancelled`
/// cross the boundary of the scan/wait/batch operations under the default
/// probe-error policy. `Probe` is returned directly by the single-port probe
/// and by the higher-level operations only when fail-fast is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Environment,
    Probe,
    Exhausted,
    Timeout,
    Cancelled,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: i64 },

    #[error("invalid port range {start}-{end} (start > end)")]
    InvalidRange { start: u16, end: u16 },

    #[error("invalid {name}: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    #[error("wrong environment: requires {required}, running in {actual}")]
    Environment {
        required: &'static str,
        actual: &'static str,
    },

    #[error("probe of {host}:{port} failed: {source}")]
    Probe {
        port: u16,
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("no available port on {host} in {start}-{end} after {attempts} attempts")]
    Exhausted {
        host: String,
        start: u16,
        end: u16,
        attempts: u32,
    },

    #[error("timed out after {timeout:?} waiting for {host}:{port} to become {target}")]
    Timeout {
        port: u16,
        host: String,
        timeout: Duration,
        target: PortState,
    },

    #[error("wait for port {port} was cancelled")]
    Cancelled { port: u16 },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidPort { .. }
            | Error::InvalidRange { .. }
            | Error::InvalidArgument { .. } => ErrorKind::Validation,
            Error::Environment { .. } => ErrorKind::Environment,
            Error::Probe { .. } => ErrorKind::Probe,
            Error::Exhausted { .. } => ErrorKind::Exhausted,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_classified() {
        assert_eq!(Error::InvalidPort { port: 0 }.kind(), ErrorKind::Validation);
        assert_eq!(
            Error::InvalidRange { start: 10, end: 5 }.kind(),
            ErrorKind::Validation
        );
        assert_eq!(Error::Cancelled { port: 80 }.kind(), ErrorKind::Cancelled);
        let probe = Error::Probe {
            port: 80,
            host: "localhost".into(),
            source: io::Error::new(io::ErrorKind::Other, "boom"),
        };
        assert_eq!(probe.kind(), ErrorKind::Probe);
    }

    #[test]
    fn messages_carry_context() {
        let err = Error::Exhausted {
            host: "localhost".into(),
            start: 3000,
            end: 3002,
            attempts: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("3000-3002"));
        assert!(msg.contains("3 attempts"));

        let err = Error::Timeout {
            port: 8080,
            host: "127.0.0.1".into(),
            timeout: Duration::from_millis(250),
            target: PortState::Available,
        };
        assert!(err.to_string().contains("127.0.0.1:8080"));
        assert!(err.to_string().contains("available"));
    }
}
