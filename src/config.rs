use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use utilbox_rs::probe::ProbeOptions;
use utilbox_rs::scanner::{BatchOptions, FindPortOptions};
use utilbox_rs::watcher::WaitOptions;

pub const DEFAULT_CONFIG_FILE: &str = "utilbox.yaml";

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ProbeConfig {
    pub host: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct FindConfig {
    pub start_port: Option<u16>,
    pub end_port: Option<u16>,
    pub max_tries: Option<u32>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct WaitConfig {
    pub poll_interval_ms: Option<u64>,
    pub overall_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    pub ports: Option<String>,
    pub concurrency: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub find: FindConfig,
    #[serde(default)]
    pub wait: WaitConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

/// Load the config at `path`, or `./utilbox.yaml` if it exists.
///
/// A missing default file yields the empty config; an explicit path that
/// cannot be read or parsed is an error.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new(DEFAULT_CONFIG_FILE);
            if p.exists() {
                p.to_path_buf()
            } else {
                return Ok(Config::default());
            }
        }
    };
    let s = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    parse_config(&s).with_context(|| format!("invalid config file: {}", path.display()))
}

pub fn parse_config(s: &str) -> Result<Config> {
    if s.trim().is_empty() {
        return Ok(Config::default());
    }
    Ok(serde_yaml::from_str(s)?)
}

impl Config {
    /// CLI flag > config file > library default.
    pub fn probe_options(&self, host: Option<String>, timeout_ms: Option<u64>) -> ProbeOptions {
        let mut opts = ProbeOptions::default();
        if let Some(h) = host.or_else(|| self.probe.host.clone()) {
            opts = opts.host(h);
        }
        if let Some(ms) = timeout_ms.or(self.probe.timeout_ms) {
            opts = opts.timeout_ms(ms);
        }
        opts
    }

    pub fn find_options(
        &self,
        probe: ProbeOptions,
        start: Option<u16>,
        end: Option<u16>,
        max_tries: Option<u32>,
    ) -> FindPortOptions {
        let mut opts = FindPortOptions::default().probe(probe);
        if let Some(s) = start.or(self.find.start_port) {
            opts.start_port = s;
        }
        if let Some(e) = end.or(self.find.end_port) {
            opts.end_port = e;
        }
        if let Some(t) = max_tries.or(self.find.max_tries) {
            opts.max_tries = t;
        }
        opts
    }

    pub fn wait_options(
        &self,
        probe: ProbeOptions,
        poll_interval_ms: Option<u64>,
        overall_timeout_ms: Option<u64>,
    ) -> WaitOptions {
        let mut opts = WaitOptions::default().probe(probe);
        if let Some(ms) = poll_interval_ms.or(self.wait.poll_interval_ms) {
            opts.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = overall_timeout_ms.or(self.wait.overall_timeout_ms) {
            opts.overall_timeout = Duration::from_millis(ms);
        }
        opts
    }

    pub fn batch_options(&self, probe: ProbeOptions, concurrency: Option<usize>) -> BatchOptions {
        let mut opts = BatchOptions::default().probe(probe);
        if let Some(c) = concurrency.or(self.batch.concurrency) {
            opts.concurrency = c;
        }
        opts
    }
}
