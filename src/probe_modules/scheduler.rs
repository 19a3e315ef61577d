//! Runs one repeating probe cycle per target, each in its own task.
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::probe_modules::config::ProbeSettings;
use crate::probe_modules::cycle::ProbeCycle;
use crate::probe_modules::models::Target;
use crate::probe_modules::secure_channel::SecureConnector;
use crate::probe_modules::sink::ResultSink;

/// Outcome of a `stop()` call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StopReport {
    /// Whether this call raised the stop flag. False on repeated calls.
    pub signalled: bool,
    /// Target tasks that exited on their own within the bound.
    pub finished: usize,
    /// Target tasks still in a cycle when the bound ran out.
    pub aborted: usize,
}

struct TargetTask {
    target: Target,
    handle: JoinHandle<()>,
}

pub struct TargetScheduler {
    stop_tx: watch::Sender<bool>,
    tasks: Vec<TargetTask>,
    stop_timeout: Duration,
}

impl TargetScheduler {
    /// Spawns one independent execution per target. Must be called from
    /// within a tokio runtime.
    pub fn start(
        targets: Vec<Target>,
        sink: Arc<dyn ResultSink>,
        connector: SecureConnector,
        settings: ProbeSettings,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        let tasks = targets
            .into_iter()
            .map(|target| {
                let cycle = ProbeCycle::new(target.clone(), connector.clone(), &settings);
                let handle = tokio::spawn(run_target(
                    cycle,
                    Arc::clone(&sink),
                    settings.interval,
                    stop_tx.subscribe(),
                ));
                TargetTask { target, handle }
            })
            .collect::<Vec<_>>();
        info!(targets = tasks.len(), interval = ?settings.interval, "Scheduler started.");

        Self {
            stop_tx,
            tasks,
            stop_timeout: settings.stop_timeout,
        }
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.tasks.iter().map(|t| &t.target)
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Raises the stop flag, then waits up to the configured bound for every
    /// target to finish its in-flight cycle. Targets still running after the
    /// bound are aborted and reported. Calling it again is a no-op.
    pub async fn stop(&mut self) -> StopReport {
        let signalled = self.stop_tx.send_if_modified(|stopped| {
            if *stopped {
                false
            } else {
                *stopped = true;
                true
            }
        });
        if signalled {
            info!(targets = self.tasks.len(), "Stop requested, waiting for in-flight cycles.");
        }

        let deadline = Instant::now() + self.stop_timeout;
        let mut report = StopReport {
            signalled,
            ..StopReport::default()
        };
        for TargetTask { target, mut handle } in self.tasks.drain(..) {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => report.finished += 1,
                Ok(Err(e)) => {
                    error!(host = %target, error = %e, "Target task ended abnormally.");
                    report.finished += 1;
                }
                Err(_) => {
                    warn!(host = %target, "Target still mid-cycle at stop deadline, aborting.");
                    handle.abort();
                    report.aborted += 1;
                }
            }
        }
        if signalled {
            info!(finished = report.finished, aborted = report.aborted, "Scheduler stopped.");
        }
        report
    }
}

/// Repeats cycles for one target until the stop flag is raised or the
/// scheduler is dropped. Records are delivered in completion order.
async fn run_target(
    cycle: ProbeCycle,
    sink: Arc<dyn ResultSink>,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    let host = cycle.target().clone();
    info!(host = %host, "Target execution started.");
    let mut completed: u64 = 0;

    loop {
        if *stop_rx.borrow_and_update() {
            break;
        }

        let record = cycle.run().await;
        completed += 1;
        if let Err(e) = sink.on_measurement(&record).await {
            warn!(host = %host, error = %e, "Result sink rejected a record.");
        }

        tokio::select! {
            biased;
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
    info!(host = %host, cycles = completed, "Target execution finished.");
}
