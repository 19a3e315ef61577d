use tracing::{debug, warn};

use crate::probe_modules::config::ProbeSettings;
use crate::probe_modules::latency::LatencyProbe;
use crate::probe_modules::models::{MeasurementRecord, ProbeOutcome, Target};
use crate::probe_modules::secure_channel::SecureConnector;
use crate::probe_modules::throughput::ThroughputProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Latency,
    Download,
    Upload,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Latency => "latency",
            Stage::Download => "download",
            Stage::Upload => "upload",
        }
    }
}

/// One measurement pass for one target: latency, download, upload, in order.
#[derive(Clone)]
pub struct ProbeCycle {
    target: Target,
    latency: LatencyProbe,
    throughput: ThroughputProbe,
}

impl ProbeCycle {
    pub fn new(target: Target, connector: SecureConnector, settings: &ProbeSettings) -> Self {
        Self {
            target,
            latency: LatencyProbe::new(settings.connect_timeout),
            throughput: ThroughputProbe::new(
                connector,
                settings.connect_timeout,
                settings.io_timeout,
            ),
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Runs all three stages and always yields a record. A failed stage is
    /// logged and contributes 0.
    pub async fn run(&self) -> MeasurementRecord {
        let latency = self.latency.try_measure(&self.target).await;
        let ping = self.fold(Stage::Latency, latency.into());

        let download = self.throughput.measure_download(&self.target).await;
        let download = self.fold(Stage::Download, download.into());

        let upload = self.throughput.measure_upload(&self.target).await;
        let upload = self.fold(Stage::Upload, upload.into());

        let record = MeasurementRecord::completed(self.target.clone(), download, upload, ping);
        debug!(
            host = %self.target,
            ping_ms = record.ping_ms,
            download_kbps = record.download_rate_kbps,
            upload_kbps = record.upload_rate_kbps,
            "Cycle complete."
        );
        record
    }

    fn fold(&self, stage: Stage, outcome: ProbeOutcome) -> f64 {
        if let Some(e) = outcome.error() {
            warn!(
                host = %self.target,
                stage = stage.as_str(),
                kind = e.kind(),
                error = %e,
                "Probe stage failed, reporting 0."
            );
        }
        outcome.value_or_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe_modules::test_support::{TlsTestServer, unused_local_port};
    use rustls::RootCertStore;
    use std::time::Duration;

    fn settings() -> ProbeSettings {
        ProbeSettings {
            interval: Duration::from_millis(50),
            connect_timeout: Duration::from_secs(2),
            io_timeout: Duration::from_secs(2),
            stop_timeout: Duration::from_secs(10),
        }
    }

    #[tokio::test]
    async fn working_endpoint_yields_positive_ping_and_download() {
        let server = TlsTestServer::start(b"HTTP/1.1 200 OK\r\n\r\nhello".to_vec()).await;
        let connector = SecureConnector::with_roots(server.roots()).unwrap();
        let target = Target::new("localhost", server.port());
        let cycle = ProbeCycle::new(target, connector, &settings());

        let record = cycle.run().await;
        assert_eq!(record.target, Target::new("localhost", server.port()));
        assert!(record.ping_ms > 0.0);
        assert!(record.download_rate_kbps > 0.0);
        assert!(record.upload_rate_kbps > 0.0);
    }

    #[tokio::test]
    async fn nothing_listening_yields_all_zero_record() {
        let port = unused_local_port().await;
        let connector = SecureConnector::with_roots(RootCertStore::empty()).unwrap();
        let cycle = ProbeCycle::new(Target::new("127.0.0.1", port), connector, &settings());

        let record = cycle.run().await;
        assert!(record.is_all_zero());
    }

    #[tokio::test]
    async fn untrusted_endpoint_keeps_ping_but_zeroes_rates() {
        let server = TlsTestServer::start(b"HTTP/1.1 200 OK\r\n\r\n".to_vec()).await;
        let connector = SecureConnector::with_roots(RootCertStore::empty()).unwrap();
        let target = Target::new("localhost", server.port());
        let cycle = ProbeCycle::new(target, connector, &settings());

        let record = cycle.run().await;
        assert!(record.ping_ms > 0.0);
        assert_eq!(record.download_rate_kbps, 0.0);
        assert_eq!(record.upload_rate_kbps, 0.0);
    }
}
