//! Deadline-bounded polling shared by every waiting stage.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

/// Sleep schedule toward a fixed deadline.
///
/// `tick` sleeps at most `interval` and never past the deadline. It returns `false`
/// once the deadline has been reached, so a loop that checks its condition before
/// calling `tick` always gets one last look at the page after the final sleep.
#[derive(Clone, Copy, Debug)]
pub struct Poller {
    deadline: Instant,
    interval: Duration,
}

impl Poller {
    pub fn new(deadline: Instant, interval: Duration) -> Self {
        Self { deadline, interval }
    }

    pub fn within(budget: Duration, interval: Duration) -> Self {
        Self::new(Instant::now() + budget, interval)
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub async fn tick(&self) -> bool {
        let remaining = self.remaining();
        if remaining.is_zero() {
            return false;
        }
        sleep(self.interval.min(remaining)).await;
        true
    }
}

/// Earliest of `now + budget` and `cap`.
pub fn deadline_within(budget: Duration, cap: Instant) -> Instant {
    (Instant::now() + budget).min(cap)
}

/// Runs `check` until it yields a value or the deadline passes.
pub async fn poll_until<T, E, F, Fut>(poller: Poller, mut check: F) -> Result<Option<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    loop {
        if let Some(value) = check().await? {
            return Ok(Some(value));
        }
        if !poller.tick().await {
            return Ok(None);
        }
    }
}

/// Emits progress at a fixed cadence during long waits.
#[derive(Debug)]
pub struct Heartbeat {
    every: Duration,
    next: Instant,
}

impl Heartbeat {
    pub fn new(every: Duration) -> Self {
        Self {
            every,
            next: Instant::now() + every,
        }
    }

    pub fn due(&mut self) -> bool {
        let now = Instant::now();
        if now < self.next {
            return false;
        }
        self.next = now + self.every;
        true
    }
}
