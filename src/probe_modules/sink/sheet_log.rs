//! Append-only tabular results log.
//!
//! A dedicated writer thread owns the file. Every new row is appended to the
//! in-memory table and the whole file is rewritten and synced, so the file
//! on disk is always a complete table.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, mpsc};
use std::thread::JoinHandle;
use tracing::{debug, error, info};

use crate::probe_modules::error::SinkError;
use crate::probe_modules::models::MeasurementRecord;
use crate::probe_modules::sink::ResultSink;

pub const HEADER: [&str; 4] = [
    "Host",
    "Download Speed (Mbps)",
    "Upload Speed (Mbps)",
    "Ping Time (ms)",
];

/// One row of the results log.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LogRow {
    #[serde(rename = "Host")]
    pub host: String,
    #[serde(rename = "Download Speed (Mbps)")]
    pub download_speed: f64,
    #[serde(rename = "Upload Speed (Mbps)")]
    pub upload_speed: f64,
    #[serde(rename = "Ping Time (ms)")]
    pub ping_time: f64,
}

impl From<&MeasurementRecord> for LogRow {
    fn from(record: &MeasurementRecord) -> Self {
        Self {
            host: record.target.host.clone(),
            download_speed: record.download_rate_kbps,
            upload_speed: record.upload_rate_kbps,
            ping_time: record.ping_ms,
        }
    }
}

pub struct SheetLogSink {
    tx: Mutex<Option<mpsc::Sender<LogRow>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl SheetLogSink {
    /// Creates (or truncates) the log with only the header row and starts the
    /// writer thread.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        rewrite_log(&path, &[])?;
        info!(path = ?path, "Results log created.");

        let (tx, rx) = mpsc::channel();
        let writer = std::thread::Builder::new()
            .name("results-log-writer".into())
            .spawn(move || log_writer_task(path, rx))?;

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(writer)),
        })
    }

    /// Stops accepting rows and waits for the writer to persist what it has.
    /// Later calls do nothing.
    pub async fn close(&self) {
        self.tx.lock().unwrap_or_else(|p| p.into_inner()).take();
        let writer = self.writer.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = writer {
            match tokio::task::spawn_blocking(move || handle.join()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => error!("Results log writer thread panicked."),
                Err(e) => error!(error = %e, "Failed to join results log writer."),
            }
        }
    }
}

#[async_trait]
impl ResultSink for SheetLogSink {
    async fn on_measurement(&self, record: &MeasurementRecord) -> Result<(), SinkError> {
        let guard = self.tx.lock().unwrap_or_else(|p| p.into_inner());
        match guard.as_ref() {
            Some(tx) => tx.send(LogRow::from(record)).map_err(|_| SinkError::Closed),
            None => Err(SinkError::Closed),
        }
    }
}

fn log_writer_task(path: PathBuf, rx: mpsc::Receiver<LogRow>) {
    debug!(path = ?path, "Results log writer started.");
    let mut rows = Vec::new();
    while let Ok(row) = rx.recv() {
        rows.push(row);
        match rewrite_log(&path, &rows) {
            Ok(()) => debug!(rows = rows.len(), "Results written to log."),
            Err(e) => error!(path = ?path, error = %e, "Failed to write results log."),
        }
    }
    info!(path = ?path, rows = rows.len(), "Results log writer finished.");
}

/// Writes the header plus `rows` to `path`, replacing its contents, and syncs
/// the file to disk.
fn rewrite_log(path: &Path, rows: &[LogRow]) -> Result<(), SinkError> {
    let file = File::create(path)?;
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    writer.write_record(HEADER)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    let file = writer.into_inner().map_err(|e| SinkError::Io(e.into_error()))?;
    file.sync_all()?;
    Ok(())
}

/// Reads a results log back into rows.
pub fn read_log(path: impl AsRef<Path>) -> Result<Vec<LogRow>, SinkError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    if headers.iter().ne(HEADER.iter().copied()) {
        return Err(SinkError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unexpected results log header: {headers:?}"),
        )));
    }
    reader
        .deserialize()
        .map(|row| row.map_err(SinkError::from))
        .collect()
}
