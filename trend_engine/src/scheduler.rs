//! scheduler.rs: Cycle pacing and graceful shutdown
//!
//! The trader runs one cycle, then asks the scheduler whether to run another.
//! `IntervalScheduler` sleeps the poll interval but wakes immediately on
//! cancellation; `FixedCycles` runs an exact number of cycles with no sleep.

#![allow(async_fn_in_trait)]

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub trait Scheduler {
    /// Wait until the next cycle is due.  `false` means stop.
    async fn wait_next(&mut self) -> bool;
}

#[derive(Debug, Clone)]
pub struct IntervalScheduler {
    interval:  Duration,
    shutdown:  CancellationToken,
    /// Remaining cycles after the first; `None` runs until cancelled.
    remaining: Option<u64>,
}

impl IntervalScheduler {
    pub fn new(interval: Duration, shutdown: CancellationToken) -> Self {
        Self { interval, shutdown, remaining: None }
    }

    /// Stop after `cycles` cycles in total (the first runs immediately).
    pub fn with_max_cycles(mut self, cycles: u64) -> Self {
        self.remaining = Some(cycles.saturating_sub(1));
        self
    }
}

impl Scheduler for IntervalScheduler {
    async fn wait_next(&mut self) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        if let Some(left) = self.remaining.as_mut() {
            if *left == 0 {
                debug!("cycle budget exhausted");
                return false;
            }
            *left -= 1;
        }

        debug!(secs = self.interval.as_secs(), "sleeping until next cycle");
        tokio::select! {
            _ = self.shutdown.cancelled() => {
                info!("shutdown requested; stopping between cycles");
                false
            }
            _ = tokio::time::sleep(self.interval) => true,
        }
    }
}

/// Runs exactly `n` cycles in total without sleeping.
#[derive(Debug, Clone, Copy)]
pub struct FixedCycles(pub u64);

impl Scheduler for FixedCycles {
    async fn wait_next(&mut self) -> bool {
        // The first cycle has already run when this is called.
        if self.0 <= 1 {
            self.0 = 0;
            return false;
        }
        self.0 -= 1;
        true
    }
}
