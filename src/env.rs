//! Runtime and environment detection.
//!
//! Every network operation in this crate calls [`ensure_network_runtime`]
//! before touching a socket, so running one outside a Tokio runtime fails
//! with [`Error::Environment`] instead of panicking inside the reactor.
//!
//! Tokio does not expose which drivers a runtime was built with, so a
//! runtime created without `enable_io`/`enable_time` passes the guard and
//! still panics on first use. Build runtimes with `enable_all()`.

use crate::error::{Error, Result};
use tokio::runtime::{Handle, RuntimeFlavor};

/// The async runtime the current thread is running inside, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    MultiThread,
    CurrentThread,
    None,
}

impl RuntimeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeKind::MultiThread => "tokio multi-thread runtime",
            RuntimeKind::CurrentThread => "tokio current-thread runtime",
            RuntimeKind::None => "no async runtime",
        }
    }

    pub fn supports_network(&self) -> bool {
        !matches!(self, RuntimeKind::None)
    }
}

pub fn detect_runtime() -> RuntimeKind {
    match Handle::try_current() {
        Ok(handle) => match handle.runtime_flavor() {
            RuntimeFlavor::CurrentThread => RuntimeKind::CurrentThread,
            _ => RuntimeKind::MultiThread,
        },
        Err(_) => RuntimeKind::None,
    }
}

/// Capability guard for operations that open TCP sockets: fails unless the
/// caller is inside a Tokio runtime. Driver configuration is not checked.
pub fn ensure_network_runtime() -> Result<()> {
    let kind = detect_runtime();
    if kind.supports_network() {
        Ok(())
    } else {
        Err(Error::Environment {
            required: "a tokio runtime",
            actual: kind.as_str(),
        })
    }
}

/// True when a well-known CI variable is set to a non-empty, non-"false" value.
pub fn is_ci() -> bool {
    const VARS: &[&str] = &[
        "CI",
        "CONTINUOUS_INTEGRATION",
        "GITHUB_ACTIONS",
        "GITLAB_CI",
        "BUILDKITE",
        "TF_BUILD",
    ];
    VARS.iter().any(|v| match std::env::var(v) {
        Ok(val) => !val.is_empty() && !val.eq_ignore_ascii_case("false") && val != "0",
        Err(_) => false,
    })
}

pub fn is_debug_build() -> bool {
    cfg!(debug_assertions)
}

pub fn target_os() -> &'static str {
    std::env::consts::OS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn no_runtime_outside_tokio() {
        assert_eq!(detect_runtime(), RuntimeKind::None);
        let err = ensure_network_runtime().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Environment);
        assert!(err.to_string().contains("no async runtime"));
    }

    #[tokio::test]
    async fn current_thread_runtime_detected() {
        assert_eq!(detect_runtime(), RuntimeKind::CurrentThread);
        assert!(ensure_network_runtime().is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn multi_thread_runtime_detected() {
        assert_eq!(detect_runtime(), RuntimeKind::MultiThread);
    }

    #[test]
    fn guard_checks_runtime_presence_only() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        // no I/O driver, but a runtime is present
        rt.block_on(async {
            assert_eq!(detect_runtime(), RuntimeKind::CurrentThread);
            assert!(ensure_network_runtime().is_ok());
        });
        let err = ensure_network_runtime().unwrap_err();
        assert!(err.to_string().contains("a tokio runtime"));
    }

    #[test]
    fn target_os_is_known() {
        assert!(!target_os().is_empty());
    }
}
