//! Catch-up over a range of periods.
//!
//! Each period is an independent run of [`BatchLoader::run`]. Retryable
//! failures are re-run after a delay; others are recorded and the driver moves
//! on to the next period.

use std::time::Duration;

use tracing::{info, warn};

use snowdrift_core::error::PeriodError;
use snowdrift_core::period::RunPeriod;

use crate::loader::{BatchLoader, LoadOutcome};
use crate::warehouse::Warehouse;

/// How often and how long to wait before re-running a failed period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first.
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 1,
            delay: Duration::from_secs(15),
        }
    }
}

/// A period that still failed after its retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedPeriod {
    pub period: RunPeriod,
    pub attempts: u32,
    pub message: String,
}

/// Totals over a back-fill.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    pub loaded: usize,
    pub skipped: usize,
    pub rows: usize,
    pub failed: Vec<FailedPeriod>,
}

impl BackfillSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn periods(&self) -> usize {
        self.loaded + self.skipped + self.failed.len()
    }
}

/// Runs a loader over consecutive periods.
pub struct Backfill<W: Warehouse> {
    loader: BatchLoader<W>,
    policy: RetryPolicy,
}

impl<W: Warehouse> Backfill<W> {
    pub fn new(loader: BatchLoader<W>, policy: RetryPolicy) -> Self {
        Self { loader, policy }
    }

    /// Load every period from `start` to `end`, both inclusive, in order.
    pub async fn run(&self, start: RunPeriod, end: RunPeriod) -> Result<BackfillSummary, PeriodError> {
        let mut summary = BackfillSummary::default();

        for period in RunPeriod::months_between(start, end)? {
            let (outcome, attempts) = self.run_with_retries(period).await;
            match outcome {
                LoadOutcome::Loaded { rows, .. } => {
                    summary.loaded += 1;
                    summary.rows += rows;
                }
                LoadOutcome::Skipped(_) => summary.skipped += 1,
                LoadOutcome::Failed(err) => summary.failed.push(FailedPeriod {
                    period,
                    attempts,
                    message: err.to_string(),
                }),
            }
        }

        info!(
            from = %start,
            to = %end,
            loaded = summary.loaded,
            skipped = summary.skipped,
            failed = summary.failed.len(),
            rows = summary.rows,
            "Back-fill finished"
        );
        Ok(summary)
    }

    async fn run_with_retries(&self, period: RunPeriod) -> (LoadOutcome, u32) {
        let mut attempts = 1;
        loop {
            let outcome = self.loader.run(period).await;
            let retry = match outcome.error() {
                Some(err) => err.is_retryable() && attempts <= self.policy.retries,
                None => false,
            };
            if !retry {
                return (outcome, attempts);
            }

            warn!(
                period = %period,
                attempt = attempts,
                delay_secs = self.policy.delay.as_secs_f64(),
                "Retrying failed period"
            );
            tokio::time::sleep(self.policy.delay).await;
            attempts += 1;
        }
    }
}
