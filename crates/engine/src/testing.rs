//! Test doubles for the clock and the observability sink.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::{
    clock::Clock,
    observability::{AttemptEvent, ObservabilitySink},
};

/// Clock driven by tokio's timer.
///
/// `now()` is a fixed epoch plus the time elapsed on tokio's clock, so under
/// `#[tokio::test(start_paused = true)]` timestamps advance exactly with
/// simulated sleeps and latencies. Every requested sleep is recorded.
pub struct TestClock {
    epoch: DateTime<Utc>,
    started: tokio::time::Instant,
    sleeps: Mutex<Vec<Duration>>,
}

impl TestClock {
    pub fn new() -> Self {
        Self {
            epoch: Utc.with_ymd_and_hms(2019, 1, 12, 0, 0, 0).unwrap(),
            started: tokio::time::Instant::now(),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Delays requested through [`Clock::sleep`], in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = tokio::time::Instant::now() - self.started;
        self.epoch
            + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero())
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        tokio::time::sleep(duration).await;
    }
}

/// Keeps every event it receives.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<AttemptEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AttemptEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_for(&self, task_id: &str) -> Vec<AttemptEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.task_id == task_id)
            .collect()
    }
}

impl ObservabilitySink for RecordingSink {
    fn record(&self, event: &AttemptEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// A sink whose backend is always down.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingSink;

impl ObservabilitySink for FailingSink {
    fn record(&self, _event: &AttemptEvent) -> anyhow::Result<()> {
        anyhow::bail!("metrics backend unreachable")
    }
}
