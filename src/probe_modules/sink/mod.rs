//! Consumers of completed measurement records.
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::error;

use crate::probe_modules::error::SinkError;
use crate::probe_modules::models::MeasurementRecord;

pub mod console;
pub mod sheet_log;

pub use console::ConsoleSink;
pub use sheet_log::SheetLogSink;

/// Receives every completed record. Called concurrently from all target
/// tasks, so implementations serialize internally and must return promptly.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn on_measurement(&self, record: &MeasurementRecord) -> Result<(), SinkError>;
}

/// Delivers each record to every subscriber in registration order. A failing
/// subscriber is logged and skipped.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ResultSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl ResultSink for FanoutSink {
    async fn on_measurement(&self, record: &MeasurementRecord) -> Result<(), SinkError> {
        for sink in &self.sinks {
            if let Err(e) = sink.on_measurement(record).await {
                error!(host = %record.target, error = %e, "Result subscriber failed.");
            }
        }
        Ok(())
    }
}

/// Forwards records into a tokio channel for consumers that want a stream.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<MeasurementRecord>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<MeasurementRecord>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ResultSink for ChannelSink {
    async fn on_measurement(&self, record: &MeasurementRecord) -> Result<(), SinkError> {
        self.tx
            .send(record.clone())
            .await
            .map_err(|_| SinkError::Closed)
    }
}
