use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use std::sync::Mutex;

/// Market-local wall clock.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;

    /// Suspends until `deadline`. Returns immediately if it has already passed.
    async fn sleep_until(&self, deadline: DateTime<FixedOffset>);
}

pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }

    async fn sleep_until(&self, deadline: DateTime<FixedOffset>) {
        let remaining = deadline - self.now();
        if let Ok(duration) = remaining.to_std() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Simulated clock: `sleep_until` jumps straight to the deadline.
pub struct ManualClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl ManualClock {
    pub fn new(start: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    fn jump_to(&self, deadline: DateTime<FixedOffset>) {
        if let Ok(mut now) = self.now.lock() {
            if deadline > *now {
                *now = deadline;
            }
        }
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    async fn sleep_until(&self, deadline: DateTime<FixedOffset>) {
        self.jump_to(deadline);
        tokio::task::yield_now().await;
    }
}
