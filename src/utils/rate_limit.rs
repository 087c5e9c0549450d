use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Process-wide spacing of outbound requests to the registry.
///
/// Holds the earliest instant at which the next request may leave. Callers
/// queue on the mutex, so the interval holds across every worker sharing
/// the limiter, not per worker.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

static EDGAR_RATE_LIMITER: OnceCell<Arc<RateLimiter>> = OnceCell::new();

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        RateLimiter {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Waits until this caller may send one request.
    pub async fn acquire(&self) {
        let mut next_slot = self.next_slot.lock().await;
        if let Some(at) = *next_slot {
            if at > Instant::now() {
                tokio::time::sleep_until(at).await;
            }
        }
        *next_slot = Some(Instant::now() + self.min_interval);
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// The limiter shared by everything that talks to the registry host.
    ///
    /// The interval of the first call wins; later calls get the same instance.
    pub fn edgar(min_interval: Duration) -> Arc<RateLimiter> {
        EDGAR_RATE_LIMITER
            .get_or_init(|| Arc::new(RateLimiter::new(min_interval)))
            .clone()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}
