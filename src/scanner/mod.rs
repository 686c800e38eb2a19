//! Verdict Service — pluggable external threat checking.
//!
//! A [`Scanner`] never returns an error: network failures, timeouts and
//! unparsable bodies all degrade to `{verdict: unknown, zone: Grey}` so the
//! pipeline always produces a reply.

pub mod opentip;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use opentip::OpenTipScanner;

/// Normalized classification of an item's safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Clean,
    Suspicious,
    Malicious,
    Unknown,
}

impl Verdict {
    /// Exact mapping from the vendor's `Zone` field. This is the external
    /// contract: Green → clean, Yellow → suspicious, Red → malicious,
    /// anything else → unknown.
    pub fn from_zone(zone: &str) -> Self {
        match zone {
            "Green" => Verdict::Clean,
            "Yellow" => Verdict::Suspicious,
            "Red" => Verdict::Malicious,
            _ => Verdict::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Clean => "clean",
            Verdict::Suspicious => "suspicious",
            Verdict::Malicious => "malicious",
            Verdict::Unknown => "unknown",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "clean" => Verdict::Clean,
            "suspicious" => Verdict::Suspicious,
            "malicious" => Verdict::Malicious,
            _ => Verdict::Unknown,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single check: the normalized verdict plus the vendor's raw
/// zone for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub verdict: Verdict,
    pub zone: String,
}

impl ScanResult {
    /// Neutral result used whenever the vendor cannot be consulted.
    pub fn unknown() -> Self {
        Self {
            verdict: Verdict::Unknown,
            zone: "Grey".to_string(),
        }
    }

    pub fn from_zone(zone: &str) -> Self {
        Self {
            verdict: Verdict::from_zone(zone),
            zone: zone.to_string(),
        }
    }
}

/// Bounded retry policy for the file-result poll loop.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl PollPolicy {
    /// Terminal statuses for a file scan; anything else means the sample is
    /// still queued and worth polling again.
    pub fn is_terminal(status: &str) -> bool {
        matches!(status.to_ascii_uppercase().as_str(), "DONE" | "FINISHED" | "ERROR")
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(5),
        }
    }
}

/// External checker for links and files.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Single bounded-timeout reputation lookup.
    async fn check_link(&self, url: &str) -> ScanResult;

    /// Two-phase scan: submit the bytes, then poll for a terminal result.
    async fn check_file(&self, bytes: &[u8], filename: &str) -> ScanResult;
}
