use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default minimum time between two requests.
pub const DEFAULT_REQUEST_INTERVAL: Duration = Duration::from_millis(250);

/// Request rate limiter shared by all callers.
///
/// The lock is held while waiting, so concurrent callers are released
/// one at a time at least `min_interval` apart.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Throttle {
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until a request may be sent.
    pub async fn acquire(&self) {
        let mut next_slot = self.next_slot.lock().await;
        if let Some(slot) = *next_slot
            && slot > Instant::now()
        {
            tokio::time::sleep_until(slot).await;
        }
        *next_slot = Some(Instant::now() + self.min_interval);
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_INTERVAL)
    }
}
