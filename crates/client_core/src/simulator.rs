use std::{future::Future, ops::ControlFlow, time::Duration};

use shared::domain::{SimulationSnapshot, SimulationStatus};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::task::TaskGuard;

pub const DEFAULT_PROGRESS_STEP: u8 = 5;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 150;
/// `interval_at` rejects a zero period.
const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);
const COMPLETE_PROGRESS: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Advanced(u8),
    /// Returned by the single tick that reaches 100.
    Completed,
    AlreadyComplete,
    NotRunning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationRun {
    progress: u8,
    status: SimulationStatus,
    step: u8,
}

impl Default for SimulationRun {
    fn default() -> Self {
        Self {
            progress: 0,
            status: SimulationStatus::Idle,
            step: DEFAULT_PROGRESS_STEP,
        }
    }
}

impl SimulationRun {
    pub fn start() -> Self {
        Self::start_with_step(DEFAULT_PROGRESS_STEP)
    }

    pub fn start_with_step(step: u8) -> Self {
        Self {
            progress: 0,
            status: SimulationStatus::Running,
            step: step.clamp(1, COMPLETE_PROGRESS),
        }
    }

    pub fn tick(&mut self) -> TickOutcome {
        match self.status {
            SimulationStatus::Idle => TickOutcome::NotRunning,
            SimulationStatus::Complete => TickOutcome::AlreadyComplete,
            SimulationStatus::Running => {
                self.progress = self
                    .progress
                    .saturating_add(self.step)
                    .min(COMPLETE_PROGRESS);
                if self.progress == COMPLETE_PROGRESS {
                    self.status = SimulationStatus::Complete;
                    TickOutcome::Completed
                } else {
                    TickOutcome::Advanced(self.progress)
                }
            }
        }
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn status(&self) -> SimulationStatus {
        self.status
    }

    pub fn is_complete(&self) -> bool {
        self.status == SimulationStatus::Complete
    }

    pub fn snapshot(&self) -> SimulationSnapshot {
        SimulationSnapshot {
            progress: self.progress,
            status: self.status,
        }
    }
}

/// Produces simulation runs and the periodic task that paces them.
#[derive(Debug, Clone, Copy)]
pub struct TokenizationSimulator {
    interval: Duration,
    step: u8,
}

impl TokenizationSimulator {
    /// Intervals below one millisecond are raised to one millisecond.
    pub fn new(interval: Duration, step: u8) -> Self {
        Self {
            interval: interval.max(MIN_TICK_INTERVAL),
            step,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn start(&self) -> SimulationRun {
        SimulationRun::start_with_step(self.step)
    }

    /// Calls `on_tick` once per interval, starting one interval from now,
    /// until it breaks or the returned guard is cancelled/dropped.
    pub fn spawn_ticker<F, Fut>(&self, mut on_tick: F) -> TaskGuard
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let period = self.interval;
        TaskGuard::spawn("simulation_ticker", async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if on_tick().await.is_break() {
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "tests/simulator_tests.rs"]
mod tests;
