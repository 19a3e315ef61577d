//! Measurement engine: probes, per-target cycles, the scheduler and result sinks.
pub mod config;
pub mod cycle;
pub mod error;
pub mod latency;
pub mod models;
pub mod scheduler;
pub mod secure_channel;
pub mod sink;
pub mod throughput;

#[cfg(test)]
pub(crate) mod test_support;
