//! Single-port TCP probe.
//!
//! A probe is one connect attempt bounded by a timeout. It reports whether
//! something accepted the connection; refusal and timeout are ordinary
//! negative outcomes, anything else is surfaced as [`Error::Probe`].

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use crate::env::ensure_network_runtime;
use crate::error::{Error, Result};
use crate::ports::validate_port;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Something that can tell whether `host:port` accepts connections.
///
/// [`TcpProbe`] is the production implementation; the scanner, watcher and
/// batch prober are generic over this trait so their retry policies can be
/// driven by any source of observations.
pub trait Probe: Send + Sync {
    fn probe(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> impl Future<Output = Result<bool>> + Send;
}

/// Probe by opening (and immediately dropping) a TCP connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

impl Probe for TcpProbe {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> Result<bool> {
        let start = Instant::now();
        match time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                debug!(host, port, latency_ms, "port reachable");
                Ok(true)
            }
            Ok(Err(e)) if is_refusal(&e) => {
                debug!(host, port, error = %e, "port not reachable");
                Ok(false)
            }
            Ok(Err(e)) => Err(Error::Probe {
                port,
                host: host.to_string(),
                source: e,
            }),
            Err(_) => {
                debug!(host, port, timeout_ms = timeout.as_millis() as u64, "probe timed out");
                Ok(false)
            }
        }
    }
}

fn is_refusal(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::TimedOut
    )
}

/// What the scanner, watcher and batch prober do when a single probe errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProbeErrorPolicy {
    /// Log, notify the observer, and treat the port as not in the desired state.
    #[default]
    LogAndContinue,
    /// Abort the whole operation with the probe error.
    FailFast,
}

/// Callback invoked with `(port, error)` for every swallowed probe error.
#[derive(Clone)]
pub struct ProbeObserver(Arc<dyn Fn(u16, &Error) + Send + Sync>);

impl ProbeObserver {
    pub fn new(f: impl Fn(u16, &Error) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    fn notify(&self, port: u16, err: &Error) {
        (self.0)(port, err)
    }
}

impl fmt::Debug for ProbeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProbeObserver(..)")
    }
}

/// Options shared by every probing operation.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub host: String,
    pub timeout: Duration,
    pub error_policy: ProbeErrorPolicy,
    pub observer: Option<ProbeObserver>,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            timeout: DEFAULT_PROBE_TIMEOUT,
            error_policy: ProbeErrorPolicy::default(),
            observer: None,
        }
    }
}

impl ProbeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout_ms(self, ms: u64) -> Self {
        self.timeout(Duration::from_millis(ms))
    }

    pub fn error_policy(mut self, policy: ProbeErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    pub fn on_probe_error(mut self, f: impl Fn(u16, &Error) + Send + Sync + 'static) -> Self {
        self.observer = Some(ProbeObserver::new(f));
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::invalid("host", "must not be empty"));
        }
        if self.timeout.is_zero() {
            return Err(Error::invalid("timeout", "must be greater than zero"));
        }
        Ok(())
    }

    /// Apply the error policy to a failed probe of `port`.
    ///
    /// Returns `Ok(())` when the error was swallowed and the caller should
    /// treat the port as not being in the desired state.
    pub(crate) fn absorb(&self, port: u16, err: Error) -> Result<()> {
        match self.error_policy {
            ProbeErrorPolicy::FailFast => Err(err),
            ProbeErrorPolicy::LogAndContinue => {
                warn!(
                    host = %self.host,
                    port,
                    error = %err,
                    "probe failed; treating as inconclusive"
                );
                if let Some(observer) = &self.observer {
                    observer.notify(port, &err);
                }
                Ok(())
            }
        }
    }
}

/// Whether something accepts TCP connections on `port`.
pub async fn is_port_in_use(port: u16, opts: &ProbeOptions) -> Result<bool> {
    is_port_in_use_with(&TcpProbe, port, opts).await
}

/// Whether nothing accepts TCP connections on `port`.
pub async fn is_port_available(port: u16, opts: &ProbeOptions) -> Result<bool> {
    is_port_in_use(port, opts).await.map(|in_use| !in_use)
}

pub async fn is_port_in_use_with<P: Probe>(
    prober: &P,
    port: u16,
    opts: &ProbeOptions,
) -> Result<bool> {
    ensure_network_runtime()?;
    validate_port(i64::from(port))?;
    opts.validate()?;
    prober.probe(&opts.host, port, opts.timeout).await
}
