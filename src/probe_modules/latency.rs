use std::time::{Duration, Instant};
use tokio::net::TcpStream;

use crate::probe_modules::error::ProbeError;
use crate::probe_modules::models::{ProbeOutcome, Target};

pub const DEFAULT_LATENCY_TIMEOUT: Duration = Duration::from_secs(5);

/// Times a plain TCP connect. No bytes are exchanged.
#[derive(Debug, Clone, Copy)]
pub struct LatencyProbe {
    timeout: Duration,
}

impl Default for LatencyProbe {
    fn default() -> Self {
        Self::new(DEFAULT_LATENCY_TIMEOUT)
    }
}

impl LatencyProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Connect time in milliseconds, or `ConnectFailure` on refusal, timeout
    /// or resolution failure.
    pub async fn try_measure(&self, target: &Target) -> Result<f64, ProbeError> {
        let started = Instant::now();
        let connect = TcpStream::connect((target.host.as_str(), target.port));
        match tokio::time::timeout(self.timeout, connect).await {
            Ok(Ok(stream)) => {
                let elapsed = started.elapsed();
                drop(stream);
                Ok(elapsed.as_secs_f64() * 1000.0)
            }
            Ok(Err(e)) => Err(ProbeError::connect(target, e)),
            Err(_) => Err(ProbeError::connect(
                target,
                format!("connect timed out after {:?}", self.timeout),
            )),
        }
    }

    /// Connect time in milliseconds; any failure reads as 0.
    pub async fn measure(&self, target: &Target) -> f64 {
        ProbeOutcome::from(self.try_measure(target).await).value_or_zero()
    }
}
