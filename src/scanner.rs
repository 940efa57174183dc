use std::collections::{BTreeMap, BTreeSet};
use std::panic;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::env::ensure_network_runtime;
use crate::error::{Error, Result};
use crate::ports::{validate_port, validate_ports, MAX_PORT};
use crate::probe::{Probe, ProbeOptions, TcpProbe};

pub const DEFAULT_START_PORT: u16 = 3000;
pub const DEFAULT_END_PORT: u16 = MAX_PORT;
pub const DEFAULT_MAX_TRIES: u32 = 100;
pub const DEFAULT_BATCH_CONCURRENCY: usize = 1000;
const MAX_BATCH_CONCURRENCY: usize = 5_000;

/// Bounds for [`find_available_port`].
#[derive(Debug, Clone)]
pub struct FindPortOptions {
    pub probe: ProbeOptions,
    pub start_port: u16,
    pub end_port: u16,
    pub max_tries: u32,
}

impl Default for FindPortOptions {
    fn default() -> Self {
        Self {
            probe: ProbeOptions::default(),
            start_port: DEFAULT_START_PORT,
            end_port: DEFAULT_END_PORT,
            max_tries: DEFAULT_MAX_TRIES,
        }
    }
}

impl FindPortOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(mut self, probe: ProbeOptions) -> Self {
        self.probe = probe;
        self
    }

    pub fn range(mut self, start: u16, end: u16) -> Self {
        self.start_port = start;
        self.end_port = end;
        self
    }

    pub fn max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_port(i64::from(self.start_port))?;
        validate_port(i64::from(self.end_port))?;
        if self.start_port > self.end_port {
            return Err(Error::InvalidRange {
                start: self.start_port,
                end: self.end_port,
            });
        }
        if self.max_tries == 0 {
            return Err(Error::invalid("max_tries", "must be greater than zero"));
        }
        self.probe.validate()
    }
}

/// Find the first port, in ascending order from `start_port`, that nothing
/// is listening on.
///
/// The port was free when probed; nothing reserves it afterwards, so another
/// process may still bind it first.
pub async fn find_available_port(opts: &FindPortOptions) -> Result<u16> {
    find_available_port_with(&TcpProbe, opts).await
}

pub async fn find_available_port_with<P: Probe>(prober: &P, opts: &FindPortOptions) -> Result<u16> {
    ensure_network_runtime()?;
    opts.validate()?;

    let host = &opts.probe.host;
    let end = u32::from(opts.end_port);
    let mut cursor = u32::from(opts.start_port);
    let mut attempts: u32 = 0;

    while cursor <= end && attempts < opts.max_tries {
        // cursor <= end <= u16::MAX
        let port = cursor as u16;
        cursor += 1;
        attempts += 1;

        match prober.probe(host, port, opts.probe.timeout).await {
            Ok(false) => {
                info!(host = %host, port, attempts, "found available port");
                return Ok(port);
            }
            Ok(true) => debug!(host = %host, port, "port in use, trying next"),
            Err(e) => opts.probe.absorb(port, e)?,
        }
    }

    Err(Error::Exhausted {
        host: host.clone(),
        start: opts.start_port,
        end: opts.end_port,
        attempts,
    })
}

/// Options for [`check_multiple_ports`].
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub probe: ProbeOptions,
    /// Maximum number of probes in flight at once.
    pub concurrency: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            probe: ProbeOptions::default(),
            concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }
}

impl BatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(mut self, probe: ProbeOptions) -> Self {
        self.probe = probe;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}

/// Probe every port concurrently and map each distinct port to its
/// availability (`true` = nothing listening).
///
/// All ports are validated before any probe starts. With the default
/// policy a failing probe records `false` instead of failing the batch.
pub async fn check_multiple_ports(
    ports: &[u16],
    opts: &BatchOptions,
) -> Result<BTreeMap<u16, bool>> {
    check_multiple_ports_with(&TcpProbe, ports, opts).await
}

pub async fn check_multiple_ports_with<P>(
    prober: &P,
    ports: &[u16],
    opts: &BatchOptions,
) -> Result<BTreeMap<u16, bool>>
where
    P: Probe + Clone + 'static,
{
    ensure_network_runtime()?;
    validate_ports(ports)?;
    opts.probe.validate()?;

    let distinct: BTreeSet<u16> = ports.iter().copied().collect();
    let sem = Arc::new(Semaphore::new(opts.concurrency.clamp(1, MAX_BATCH_CONCURRENCY)));
    let mut set = JoinSet::new();

    for &port in &distinct {
        let prober = prober.clone();
        let host = opts.probe.host.clone();
        let timeout = opts.probe.timeout;
        let sem = sem.clone();
        set.spawn(async move {
            let _permit = sem.acquire_owned().await;
            let outcome = prober.probe(&host, port, timeout).await;
            (port, outcome)
        });
    }

    let mut results = BTreeMap::new();
    while let Some(joined) = set.join_next().await {
        let (port, outcome) = match joined {
            Ok(v) => v,
            Err(e) if e.is_panic() => panic::resume_unwind(e.into_panic()),
            Err(e) => {
                warn!(error = %e, "probe task cancelled");
                continue;
            }
        };
        let available = match outcome {
            Ok(in_use) => !in_use,
            Err(e) => {
                opts.probe.absorb(port, e)?;
                false
            }
        };
        results.insert(port, available);
    }

    // Tasks only go missing if the runtime is shutting down.
    for port in distinct {
        results.entry(port).or_insert(false);
    }

    debug!(
        host = %opts.probe.host,
        checked = results.len(),
        available = results.values().filter(|a| **a).count(),
        "batch check complete"
    );
    Ok(results)
}
