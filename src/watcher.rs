//! Poll a single port until it reaches a target state or a deadline passes.

use std::time::Duration;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::env::ensure_network_runtime;
use crate::error::{Error, Result};
use crate::ports::validate_port;
use crate::probe::{Probe, ProbeOptions, TcpProbe};
use crate::types::PortState;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_OVERALL_TIMEOUT: Duration = Duration::from_millis(30_000);

#[derive(Debug, Clone)]
pub struct WaitOptions {
    pub probe: ProbeOptions,
    /// Target spacing between the starts of consecutive probes.
    pub poll_interval: Duration,
    /// Wall-clock bound measured from the start of the call.
    pub overall_timeout: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            probe: ProbeOptions::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            overall_timeout: DEFAULT_OVERALL_TIMEOUT,
        }
    }
}

impl WaitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(mut self, probe: ProbeOptions) -> Self {
        self.probe = probe;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::invalid("poll_interval", "must be greater than zero"));
        }
        if self.overall_timeout.is_zero() {
            return Err(Error::invalid("overall_timeout", "must be greater than zero"));
        }
        self.probe.validate()
    }
}

/// Wait until `port` is observed in the `target` state.
pub async fn wait_for_port(port: u16, target: PortState, opts: &WaitOptions) -> Result<()> {
    wait_for_port_with(&TcpProbe, port, target, opts, &CancellationToken::new()).await
}

/// Like [`wait_for_port`], but ends early with [`Error::Cancelled`] once
/// `cancel` fires. The in-flight probe and any pending sleep are dropped.
pub async fn wait_for_port_with_cancel(
    port: u16,
    target: PortState,
    opts: &WaitOptions,
    cancel: CancellationToken,
) -> Result<()> {
    wait_for_port_with(&TcpProbe, port, target, opts, &cancel).await
}

pub async fn wait_for_port_with<P: Probe>(
    prober: &P,
    port: u16,
    target: PortState,
    opts: &WaitOptions,
    cancel: &CancellationToken,
) -> Result<()> {
    ensure_network_runtime()?;
    validate_port(i64::from(port))?;
    opts.validate()?;

    let host = &opts.probe.host;
    // A timeout past the end of the clock means no deadline at all.
    let deadline = Instant::now().checked_add(opts.overall_timeout);
    let mut polls: u32 = 0;

    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Error::Timeout {
                port,
                host: host.clone(),
                timeout: opts.overall_timeout,
                target,
            });
        }

        let probe_started = Instant::now();
        polls += 1;
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled { port }),
            r = prober.probe(host, port, opts.probe.timeout) => r,
        };

        match outcome {
            Ok(reachable) => {
                let observed = PortState::from_reachable(reachable);
                if observed == target {
                    info!(host = %host, port, %target, polls, "port reached target state");
                    return Ok(());
                }
                debug!(
                    host = %host,
                    port,
                    %observed,
                    %target,
                    polls,
                    "port not yet in target state"
                );
            }
            Err(e) => opts.probe.absorb(port, e)?,
        }

        // Keep the cadence close to poll_interval: slow probes eat into the
        // sleep, and the sleep never runs past the deadline.
        let now = Instant::now();
        let mut pause = opts.poll_interval.saturating_sub(now - probe_started);
        if let Some(deadline) = deadline {
            pause = pause.min(deadline.saturating_duration_since(now));
        }
        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled { port }),
            _ = time::sleep(pause) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Reports "in use" starting from the `flip_at`-th probe (1-based).
    #[derive(Clone)]
    struct FlipsAt {
        flip_at: u32,
        calls: Arc<AtomicU32>,
    }

    impl FlipsAt {
        fn new(flip_at: u32) -> Self {
            Self {
                flip_at,
                calls: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    impl Probe for FlipsAt {
        async fn probe(&self, _host: &str, _port: u16, _timeout: Duration) -> Result<bool> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(n >= self.flip_at)
        }
    }

    /// Always errors.
    struct Broken;

    impl Probe for Broken {
        async fn probe(&self, host: &str, port: u16, _timeout: Duration) -> Result<bool> {
            Err(Error::Probe {
                port,
                host: host.to_string(),
                source: io::Error::new(io::ErrorKind::Other, "unreachable"),
            })
        }
    }

    fn opts(interval_ms: u64, overall_ms: u64) -> WaitOptions {
        WaitOptions::new()
            .poll_interval(Duration::from_millis(interval_ms))
            .overall_timeout(Duration::from_millis(overall_ms))
    }

    #[tokio::test(start_paused = true)]
    async fn returns_once_target_observed() {
        let prober = FlipsAt::new(3);
        let never = CancellationToken::new();
        wait_for_port_with(&prober, 9000, PortState::InUse, &opts(100, 5_000), &never)
            .await
            .unwrap();
        assert_eq!(prober.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_within_bounds() {
        let o = opts(1_000, 5_000);
        let start = Instant::now();
        let never = CancellationToken::new();
        let err = wait_for_port_with(&FlipsAt::new(u32::MAX), 9000, PortState::InUse, &o, &never)
            .await
            .unwrap_err();
        let elapsed = start.elapsed();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(elapsed >= o.overall_timeout);
        assert!(elapsed <= o.overall_timeout + o.poll_interval + o.probe.timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_errors_do_not_abort_polling() {
        let never = CancellationToken::new();
        let err = wait_for_port_with(&Broken, 9000, PortState::Available, &opts(100, 1_000), &never)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn fail_fast_returns_probe_error() {
        let o = opts(100, 1_000)
            .probe(ProbeOptions::new().error_policy(crate::probe::ProbeErrorPolicy::FailFast));
        let never = CancellationToken::new();
        let err = wait_for_port_with(&Broken, 9000, PortState::Available, &o, &never)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Probe);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_wait() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(250)).await;
            trigger.cancel();
        });
        let o = opts(100, 10_000);
        let err = wait_for_port_with(&FlipsAt::new(u32::MAX), 9000, PortState::InUse, &o, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled { port: 9000 }));
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_timeout_waits_for_target() {
        let prober = FlipsAt::new(4);
        let never = CancellationToken::new();
        let o = opts(100, 1).overall_timeout(Duration::MAX);
        wait_for_port_with(&prober, 9000, PortState::InUse, &o, &never)
            .await
            .unwrap();
        assert_eq!(prober.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn zero_interval_rejected() {
        let err = wait_for_port(9000, PortState::InUse, &opts(0, 1_000))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
