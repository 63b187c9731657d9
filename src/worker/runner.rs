//! Scheduling loop around [`Worker::run_cycle`]

use super::{CycleError, CycleOutcome, Worker, WorkerConfig};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Run cycles until `shutdown` flips to `true`
///
/// Shutdown interrupts the sleep between cycles; a cycle already in flight
/// runs to completion first.
pub async fn run(worker: &Worker, config: WorkerConfig, mut shutdown: watch::Receiver<bool>) {
    info!(
        interval = ?config.interval,
        idle_interval = ?config.idle_interval,
        "Worker started"
    );

    loop {
        if *shutdown.borrow() {
            break;
        }

        let started = Instant::now();
        let result = worker.run_cycle().await;
        log_cycle(&result);

        let delay = next_delay(&config, &result, started.elapsed());
        info!(next_in = ?delay, "Sleeping until next cycle");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = shutdown.changed() => {
                // Sender gone means nobody can stop us later either
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!("Worker stopped");
}

/// Time to wait after a cycle that took `elapsed`
pub fn next_delay(
    config: &WorkerConfig,
    result: &Result<CycleOutcome, CycleError>,
    elapsed: Duration,
) -> Duration {
    match result {
        Ok(CycleOutcome::Idle) => config.idle_interval,
        _ => config.interval.saturating_sub(elapsed),
    }
}

fn log_cycle(result: &Result<CycleOutcome, CycleError>) {
    match result {
        Ok(CycleOutcome::Idle) => info!("Cycle finished idle"),
        Ok(CycleOutcome::Complete) => info!("Cycle complete"),
        Ok(CycleOutcome::Incomplete) => warn!("Cycle finished with failed jobs"),
        Err(e) => error!(error = %e, "Cycle failed"),
    }
}
