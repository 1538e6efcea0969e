//! Retry pacing for the pipeline's transient-failure paths.

use async_trait::async_trait;
use std::time::Duration;

/// Sleep policy shared by the fetch, write and commit retry loops.
#[async_trait]
pub trait Backoff: Send {
    /// Block the caller for the current delay, then grow the delay.
    async fn sleep(&mut self);

    /// Restore the delay to its initial value. Called after a fully
    /// successful end-to-end cycle, never mid-retry.
    fn reset(&mut self);
}

/// Exponential backoff that doubles on every sleep.
///
/// Growth is unbounded unless a ceiling is configured; the next transient
/// failure after a [`reset`](Backoff::reset) starts from the initial delay.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    current: Duration,
    max: Option<Duration>,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration) -> Self {
        Self {
            initial,
            current: initial,
            max: None,
        }
    }

    /// Cap the delay growth at `max`.
    pub fn with_max(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            current: initial,
            max: Some(max),
        }
    }

    /// The delay the next call to `sleep` will wait for.
    pub fn current_delay(&self) -> Duration {
        self.current
    }
}

#[async_trait]
impl Backoff for ExponentialBackoff {
    async fn sleep(&mut self) {
        tokio::time::sleep(self.current).await;

        let next = self.current.saturating_mul(2);
        self.current = match self.max {
            Some(max) => next.min(max),
            None => next,
        };
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn doubles_delay_on_every_sleep() {
        let mut backoff = ExponentialBackoff::new(Duration::from_millis(100));
        assert_eq!(backoff.current_delay(), Duration::from_millis(100));

        backoff.sleep().await;
        assert_eq!(backoff.current_delay(), Duration::from_millis(200));

        backoff.sleep().await;
        assert_eq!(backoff.current_delay(), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_restores_initial_delay() {
        let mut backoff = ExponentialBackoff::new(Duration::from_millis(50));
        backoff.sleep().await;
        backoff.sleep().await;
        assert_eq!(backoff.current_delay(), Duration::from_millis(200));

        backoff.reset();
        assert_eq!(backoff.current_delay(), Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn growth_is_capped_at_configured_ceiling() {
        let mut backoff =
            ExponentialBackoff::with_max(Duration::from_millis(100), Duration::from_millis(250));

        backoff.sleep().await;
        assert_eq!(backoff.current_delay(), Duration::from_millis(200));

        backoff.sleep().await;
        assert_eq!(backoff.current_delay(), Duration::from_millis(250));

        backoff.sleep().await;
        assert_eq!(backoff.current_delay(), Duration::from_millis(250));
    }
}
