//! Scan scheduler.
//!
//! Runs one scan pass: enumerates cycles, fans evaluations out in batches
//! under a semaphore, paces batches, forwards accepted opportunities to the
//! notifier as they arrive and reports aggregate counters. A pass ends when
//! every dispatched evaluation has finished or been abandoned; scheduling
//! the next pass is the caller's job.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cycles::{self, CycleShapes};
use super::evaluator::{CycleEvaluator, Rejection};
use super::notifier::OpportunityNotifier;
use crate::types::{AssetUniverse, Opportunity, ScanReport};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Upper bound on a single notifier call.
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Maximum simultaneous cycle evaluations (and so upstream requests).
    pub concurrency: usize,
    /// Cycles issued per batch.
    pub batch_size: usize,
    /// Pause between batches; none after the last one.
    pub batch_pacing: Duration,
    /// An evaluation running longer than this is abandoned.
    pub evaluation_timeout: Duration,
    /// Whole-pass deadline, after which the pass is cancelled.
    pub scan_timeout: Option<Duration>,
    /// Notional input per cycle, in base units of the start asset.
    pub notional: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            batch_size: 4,
            batch_pacing: Duration::from_secs(1),
            evaluation_timeout: Duration::from_secs(300),
            scan_timeout: Some(Duration::from_secs(900)),
            notional: 100_000_000,
        }
    }
}

/// Everything one pass produced.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub opportunities: Vec<Opportunity>,
    pub report: ScanReport,
}

enum TaskResult {
    Accepted(Opportunity),
    Rejected(Rejection),
    TimedOut,
    Abandoned,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct ScanScheduler {
    evaluator: Arc<CycleEvaluator>,
    notifier: Arc<dyn OpportunityNotifier>,
    semaphore: Arc<Semaphore>,
    config: ScanConfig,
}

impl ScanScheduler {
    pub fn new(
        evaluator: Arc<CycleEvaluator>,
        notifier: Arc<dyn OpportunityNotifier>,
        config: ScanConfig,
    ) -> Self {
        let permits = config.concurrency.max(1);
        Self {
            evaluator,
            notifier,
            semaphore: Arc::new(Semaphore::new(permits)),
            config,
        }
    }

    pub fn evaluator(&self) -> &Arc<CycleEvaluator> {
        &self.evaluator
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Permits not currently held by an evaluation.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Run a single scan pass over `universe`.
    ///
    /// Cancelling `cancel` (or hitting the configured scan timeout) stops
    /// dispatching, aborts in-flight evaluations and returns what was
    /// collected so far with `report.cancelled` set.
    pub async fn run_scan(
        &self,
        universe: &AssetUniverse,
        shapes: &CycleShapes,
        cancel: CancellationToken,
    ) -> ScanOutcome {
        let started = Instant::now();
        let purged = self.evaluator.client().negative_cache().purge_expired();
        let cycles = cycles::enumerate(universe, shapes);
        let mut report = ScanReport::new(cycles.len());
        let mut opportunities = Vec::new();

        info!(
            scan_id = %report.scan_id,
            assets = universe.len(),
            cycles = cycles.len(),
            purged_cache_entries = purged,
            concurrency = self.config.concurrency,
            "Scan pass starting"
        );

        let cancel = cancel.child_token();
        let deadline = self.config.scan_timeout.map(|timeout| {
            let token = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                warn!(timeout_secs = timeout.as_secs(), "Scan pass timed out");
                token.cancel();
            })
        });

        let batch_size = self.config.batch_size.max(1);
        let batch_count = cycles.len().div_ceil(batch_size);
        let mut cancelled = false;

        for (index, batch) in cycles.chunks(batch_size).enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let mut tasks = JoinSet::new();
            for cycle in batch {
                let evaluator = self.evaluator.clone();
                let semaphore = self.semaphore.clone();
                let cycle = cycle.clone();
                let notional = self.config.notional;
                let eval_timeout = self.config.evaluation_timeout;

                report.cycles_attempted += 1;
                tasks.spawn(async move {
                    // Held until the task ends, however it ends.
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return TaskResult::Abandoned,
                    };
                    match tokio::time::timeout(eval_timeout, evaluator.assess(&cycle, notional))
                        .await
                    {
                        Ok(Ok(opp)) => TaskResult::Accepted(opp),
                        Ok(Err(rejection)) => {
                            debug!(cycle = %cycle, reason = %rejection, "Cycle rejected");
                            TaskResult::Rejected(rejection)
                        }
                        Err(_) => {
                            warn!(cycle = %cycle, "Cycle evaluation timed out");
                            TaskResult::TimedOut
                        }
                    }
                });
            }

            if self
                .drain(&mut tasks, &cancel, &mut report, &mut opportunities)
                .await
            {
                cancelled = true;
                break;
            }

            let is_last = index + 1 == batch_count;
            if !is_last && !self.config.batch_pacing.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.batch_pacing) => {}
                    _ = cancel.cancelled() => {
                        cancelled = true;
                        break;
                    }
                }
            }
        }

        if let Some(handle) = deadline {
            handle.abort();
        }

        report.cancelled = cancelled;
        report.finished_at = Utc::now();
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            scan_id = %report.scan_id,
            attempted = report.cycles_attempted,
            completed = report.cycles_completed,
            leg_failures = report.leg_failures,
            filtered = report.filtered,
            errors = report.evaluation_errors,
            opportunities = report.opportunities_found,
            elapsed_ms = report.elapsed_ms,
            cancelled = report.cancelled,
            "Scan pass complete"
        );

        ScanOutcome {
            opportunities,
            report,
        }
    }

    /// Collect every task of one batch. On cancellation the remaining tasks
    /// are aborted and still joined, so no task outlives the batch.
    /// Returns whether cancellation was observed.
    async fn drain(
        &self,
        tasks: &mut JoinSet<TaskResult>,
        cancel: &CancellationToken,
        report: &mut ScanReport,
        opportunities: &mut Vec<Opportunity>,
    ) -> bool {
        let mut aborted = false;
        loop {
            tokio::select! {
                _ = cancel.cancelled(), if !aborted => {
                    debug!(in_flight = tasks.len(), "Cancelling in-flight evaluations");
                    tasks.abort_all();
                    aborted = true;
                }
                joined = tasks.join_next() => match joined {
                    Some(result) => self.record(result, cancel, report, opportunities).await,
                    None => break,
                },
            }
        }
        aborted
    }

    /// Fold one task result into the report. Notifier delivery gives way
    /// to cancellation so aborting the remaining tasks is never held up.
    async fn record(
        &self,
        result: Result<TaskResult, JoinError>,
        cancel: &CancellationToken,
        report: &mut ScanReport,
        opportunities: &mut Vec<Opportunity>,
    ) {
        match result {
            Ok(TaskResult::Accepted(opp)) => {
                report.cycles_completed += 1;
                report.opportunities_found += 1;
                debug!(cycle = %opp.cycle, profit_pct = opp.profit_pct, "Opportunity accepted");
                tokio::select! {
                    delivered = tokio::time::timeout(NOTIFY_TIMEOUT, self.notifier.notify(&opp)) => {
                        match delivered {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => {
                                report.notify_failures += 1;
                                warn!(id = %opp.id, error = %e, "Notifier failed");
                            }
                            Err(_) => {
                                report.notify_failures += 1;
                                warn!(id = %opp.id, "Notifier timed out");
                            }
                        }
                    }
                    _ = cancel.cancelled() => {
                        report.notify_failures += 1;
                        warn!(id = %opp.id, "Notification interrupted by cancellation");
                    }
                }
                opportunities.push(opp);
            }
            Ok(TaskResult::Rejected(rejection)) => {
                if rejection.is_leg_failure() {
                    report.leg_failures += 1;
                } else {
                    report.cycles_completed += 1;
                    report.filtered += 1;
                }
            }
            Ok(TaskResult::TimedOut) | Ok(TaskResult::Abandoned) => {
                report.evaluation_errors += 1;
            }
            Err(e) => {
                report.evaluation_errors += 1;
                if e.is_panic() {
                    warn!(error = %e, "Cycle evaluation panicked");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
