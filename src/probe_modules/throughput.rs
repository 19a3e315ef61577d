//! Coarse throughput samples: one TLS connection, one exchange, one timing.
//!
//! Neither direction loops over reads or opens parallel streams. The figure
//! reflects a single round trip on a fresh connection, not sustained bandwidth.
use std::time::{Duration, Instant};
use tracing::debug;

use crate::probe_modules::error::ProbeError;
use crate::probe_modules::models::{Target, rate_kbps};
use crate::probe_modules::secure_channel::SecureConnector;

/// Upper bound of the single download read.
pub const DOWNLOAD_READ_BYTES: usize = 4096;
/// Upper bound of the single read that closes the upload timing window.
pub const UPLOAD_REPLY_BYTES: usize = 1024;
pub const UPLOAD_PAYLOAD: &[u8] = b"This is a test upload string.";

pub fn download_request(host: &str) -> String {
    format!("GET / HTTP/1.1\r\nHost: {host}\r\n\r\n")
}

/// Download rate for one timed read window of `elapsed_secs`.
pub fn download_rate_kbps(elapsed_secs: f64) -> f64 {
    rate_kbps(DOWNLOAD_READ_BYTES, elapsed_secs)
}

#[derive(Clone)]
pub struct ThroughputProbe {
    connector: SecureConnector,
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl ThroughputProbe {
    pub fn new(
        connector: SecureConnector,
        connect_timeout: Duration,
        io_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            connect_timeout,
            io_timeout,
        }
    }

    /// Sends a minimal `GET /` and times it together with one bounded read.
    /// The rate is always computed over the full read buffer, whatever the
    /// read returned; an empty read still completes the exchange.
    pub async fn measure_download(&self, target: &Target) -> Result<f64, ProbeError> {
        let mut channel = self
            .connector
            .open(&target.host, target.port, self.connect_timeout)
            .await?;
        let request = download_request(&target.host);

        let started = Instant::now();
        channel.send(request.as_bytes(), self.io_timeout).await?;
        let body = channel.receive(DOWNLOAD_READ_BYTES, self.io_timeout).await?;
        let elapsed = started.elapsed();

        channel.close(self.io_timeout).await;
        let kbps = download_rate_kbps(elapsed.as_secs_f64());
        debug!(peer = %target, received = body.len(), ?elapsed, kbps, "Download sample taken.");
        Ok(kbps)
    }

    /// Sends the fixed upload payload on a fresh connection and times it until
    /// the first bounded read of the reply returns.
    pub async fn measure_upload(&self, target: &Target) -> Result<f64, ProbeError> {
        let mut channel = self
            .connector
            .open(&target.host, target.port, self.connect_timeout)
            .await?;

        let started = Instant::now();
        channel.send(UPLOAD_PAYLOAD, self.io_timeout).await?;
        channel.receive(UPLOAD_REPLY_BYTES, self.io_timeout).await?;
        let elapsed = started.elapsed();

        channel.close(self.io_timeout).await;
        let kbps = rate_kbps(UPLOAD_PAYLOAD.len(), elapsed.as_secs_f64());
        debug!(
            peer = %target,
            bytes = UPLOAD_PAYLOAD.len(),
            ?elapsed,
            kbps,
            "Upload sample taken."
        );
        Ok(kbps)
    }
}
