use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::probe_modules::error::ProbeError;

/// A (host, port) pair probed for the lifetime of the process.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Result of one completed probe cycle for one target.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    pub target: Target,
    pub download_rate_kbps: f64,
    pub upload_rate_kbps: f64,
    pub ping_ms: f64,
    pub timestamp: DateTime<Utc>,
}

impl MeasurementRecord {
    /// Builds a record stamped with the current time. Non-finite or negative
    /// readings are stored as zero.
    pub fn completed(
        target: Target,
        download_rate_kbps: f64,
        upload_rate_kbps: f64,
        ping_ms: f64,
    ) -> Self {
        Self {
            target,
            download_rate_kbps: non_negative(download_rate_kbps),
            upload_rate_kbps: non_negative(upload_rate_kbps),
            ping_ms: non_negative(ping_ms),
            timestamp: Utc::now(),
        }
    }

    pub fn is_all_zero(&self) -> bool {
        self.download_rate_kbps == 0.0 && self.upload_rate_kbps == 0.0 && self.ping_ms == 0.0
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Transient outcome of a single probe stage.
#[derive(Debug)]
pub enum ProbeOutcome {
    Measured(f64),
    Failed(ProbeError),
}

impl ProbeOutcome {
    /// The fold applied at every stage boundary: failures read as zero.
    pub fn value_or_zero(&self) -> f64 {
        match self {
            ProbeOutcome::Measured(value) => non_negative(*value),
            ProbeOutcome::Failed(_) => 0.0,
        }
    }

    pub fn error(&self) -> Option<&ProbeError> {
        match self {
            ProbeOutcome::Measured(_) => None,
            ProbeOutcome::Failed(e) => Some(e),
        }
    }
}

impl From<Result<f64, ProbeError>> for ProbeOutcome {
    fn from(result: Result<f64, ProbeError>) -> Self {
        match result {
            Ok(value) => ProbeOutcome::Measured(value),
            Err(e) => ProbeOutcome::Failed(e),
        }
    }
}

/// Rate in KB/s for `bytes` moved in `elapsed_secs`. A zero or non-finite
/// interval yields zero instead of an undefined rate.
pub fn rate_kbps(bytes: usize, elapsed_secs: f64) -> f64 {
    if !(elapsed_secs.is_finite() && elapsed_secs > 0.0) {
        return 0.0;
    }
    non_negative(bytes as f64 / elapsed_secs / 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_outcome_folds_to_zero() {
        let outcome = ProbeOutcome::from(Err(ProbeError::connect("example.com:443", "refused")));
        assert_eq!(outcome.value_or_zero(), 0.0);
        assert_eq!(outcome.error().map(|e| e.kind()), Some("connect_failure"));
    }

    #[test]
    fn measured_outcome_keeps_value() {
        let outcome = ProbeOutcome::from(Ok(12.5));
        assert_eq!(outcome.value_or_zero(), 12.5);
        assert!(outcome.error().is_none());
    }

    #[test]
    fn measured_nan_or_negative_reads_as_zero() {
        assert_eq!(ProbeOutcome::Measured(f64::NAN).value_or_zero(), 0.0);
        assert_eq!(ProbeOutcome::Measured(-3.0).value_or_zero(), 0.0);
    }

    #[test]
    fn rate_is_bytes_per_second_in_kib() {
        assert_eq!(rate_kbps(4096, 1.0), 4.0);
        assert_eq!(rate_kbps(2048, 0.5), 4.0);
    }

    #[test]
    fn rate_with_zero_elapsed_is_zero() {
        assert_eq!(rate_kbps(4096, 0.0), 0.0);
        assert_eq!(rate_kbps(4096, f64::INFINITY), 0.0);
    }

    #[test]
    fn record_clamps_invalid_readings() {
        let record = MeasurementRecord::completed(Target::new("a", 1), -1.0, f64::NAN, 7.0);
        assert_eq!(record.download_rate_kbps, 0.0);
        assert_eq!(record.upload_rate_kbps, 0.0);
        assert_eq!(record.ping_ms, 7.0);
        assert!(!record.is_all_zero());
    }

    #[test]
    fn target_displays_as_host_port() {
        assert_eq!(Target::new("www.github.com", 443).to_string(), "www.github.com:443");
    }
}
