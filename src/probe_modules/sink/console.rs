use async_trait::async_trait;
use std::io::Write;

use crate::probe_modules::error::SinkError;
use crate::probe_modules::models::MeasurementRecord;
use crate::probe_modules::sink::ResultSink;

/// Prints a per-host status block for every record. Each block is written
/// under one stdout lock, so blocks from different targets never interleave.
#[derive(Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn format_block(record: &MeasurementRecord) -> String {
    format!(
        "Host: {}\nDownload Speed: {:.2} Mbps\nUpload Speed: {:.2} Mbps\nPing Time: {:.2} ms",
        record.target.host, record.download_rate_kbps, record.upload_rate_kbps, record.ping_ms
    )
}

#[async_trait]
impl ResultSink for ConsoleSink {
    async fn on_measurement(&self, record: &MeasurementRecord) -> Result<(), SinkError> {
        let block = format_block(record);
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{block}\n")?;
        stdout.flush()?;
        Ok(())
    }
}
