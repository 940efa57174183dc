use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ::time::{format_description::well_known, OffsetDateTime};

/// The two observable states of a TCP port.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PortState {
    /// Nothing accepted a connection within the probe timeout.
    Available,
    /// A connection was established.
    InUse,
}

impl PortState {
    /// Map a raw probe outcome (`true` = reachable) onto a state.
    pub fn from_reachable(reachable: bool) -> Self {
        if reachable {
            PortState::InUse
        } else {
            PortState::Available
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PortState::Available => "available",
            PortState::InUse => "in-use",
        }
    }
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PortState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "available" | "free" => Ok(PortState::Available),
            "in-use" | "in_use" | "inuse" | "used" => Ok(PortState::InUse),
            other => Err(format!(
                "unknown port state '{other}' (expected 'available' or 'in-use')"
            )),
        }
    }
}

/// One observed port, as printed by the CLI.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortReport {
    pub host: String,
    pub port: u16,
    pub state: PortState,
    pub timestamp: String,
}

impl PortReport {
    pub fn new(host: impl Into<String>, port: u16, state: PortState) -> Self {
        Self {
            host: host.into(),
            port,
            state,
            timestamp: now_rfc3339(),
        }
    }
}

/// Aggregate of a batch check.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct BatchReport {
    pub checked: u64,
    pub in_use_count: u64,
    pub entries: Vec<PortReport>,
}

impl BatchReport {
    pub fn from_entries(entries: Vec<PortReport>) -> Self {
        let in_use_count = entries
            .iter()
            .filter(|e| e.state == PortState::InUse)
            .count() as u64;
        Self {
            checked: entries.len() as u64,
            in_use_count,
            entries,
        }
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
