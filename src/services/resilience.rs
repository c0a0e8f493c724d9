// src/services/resilience.rs

//! Retry, backoff and pacing policy.
//!
//! Every network-bound operation runs through [`ResiliencePolicy::execute`]:
//!
//! - `transient` failures back off exponentially with jitter, up to
//!   `max_retries` attempts in total
//! - `blocked` failures wait out a cooldown that always exceeds the
//!   ordinary backoff for the same attempt, with a smaller attempt budget
//! - `fatal` failures return immediately
//!
//! Each success is followed by a randomized pacing pause so requests never
//! leave at a uniform cadence.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::error::{FetchError, TransientCause};
use crate::models::{Config, ResilienceConfig};
use crate::services::{ChallengeDetector, PageFetcher, RenderedPage};
use crate::utils::duration_from_secs;

/// Exponent cap so the backoff curve cannot overflow.
const MAX_EXPONENT: u32 = 30;

/// Bookkeeping for one operation across its attempts.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    pub attempt_count: u32,
    pub blocked_count: u32,
    pub last_error: Option<FetchError>,
    pub next_delay: Option<Duration>,
}

/// Wraps fetches with retry, backoff, cooldown and pacing.
#[derive(Debug)]
pub struct ResiliencePolicy {
    config: ResilienceConfig,
    guard: ChallengeDetector,
    blocked_seen: AtomicU32,
}

impl ResiliencePolicy {
    pub fn new(config: ResilienceConfig, guard: ChallengeDetector) -> Self {
        Self {
            config,
            guard,
            blocked_seen: AtomicU32::new(0),
        }
    }

    /// Build the policy from the application configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.resilience.clone(),
            ChallengeDetector::new(&config.antibot),
        )
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    /// Run `operation` until it succeeds or its retry budget runs out.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let timeout = self.config.operation_timeout();
        let mut state = RetryState::default();

        loop {
            state.attempt_count += 1;
            let result = match tokio::time::timeout(timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::transient(label, TransientCause::Timeout(timeout))),
            };

            let err = match result {
                Ok(value) => {
                    if state.attempt_count > 1 {
                        log::info!("{}: succeeded on attempt {}", label, state.attempt_count);
                    }
                    self.pause().await;
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                log::error!("{}: {}", label, err);
                return Err(err);
            }

            let retry_number = state.attempt_count - 1;
            let delay = if matches!(err, FetchError::Blocked { .. }) {
                state.blocked_count += 1;
                self.note_blocked();
                self.cooldown_delay(retry_number)
            } else {
                self.backoff_delay(retry_number)
            };

            let budget_spent = state.attempt_count >= self.config.max_retries
                || state.blocked_count >= self.config.blocked_budget();
            if budget_spent {
                log::warn!(
                    "{}: giving up after {} attempt(s): {}",
                    label,
                    state.attempt_count,
                    err
                );
                return Err(err);
            }

            log::warn!(
                "{}: attempt {}/{} failed ({}), retrying in {:.1}s",
                label,
                state.attempt_count,
                self.config.max_retries,
                err,
                delay.as_secs_f64()
            );
            state.last_error = Some(err);
            state.next_delay = Some(delay);
            tokio::time::sleep(delay).await;
        }
    }

    /// Fetch a page, treating challenge pages as `blocked`.
    pub async fn fetch_page<F>(&self, fetcher: &F, url: &str) -> Result<RenderedPage, FetchError>
    where
        F: PageFetcher + ?Sized,
    {
        self.execute(url, || async move {
            let page = fetcher.fetch(url).await?;
            self.guard.screen(page)
        })
        .await
    }

    /// Backoff before retry number `attempt` (0-based), jitter included.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_with_jitter(attempt, self.sample_jitter())
    }

    /// Largest backoff `backoff_delay` can return for `attempt`.
    pub fn max_backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_with_jitter(attempt, self.config.jitter_window())
    }

    /// Cooldown after a challenge; always above `max_backoff_delay(attempt)`.
    pub fn cooldown_delay(&self, attempt: u32) -> Duration {
        self.min_cooldown_delay(attempt)
            .saturating_add(self.sample_jitter())
    }

    /// Smallest cooldown `cooldown_delay` can return for `attempt`.
    pub fn min_cooldown_delay(&self, attempt: u32) -> Duration {
        self.max_backoff_delay(attempt)
            .saturating_add(self.config.blocked_cooldown())
    }

    /// Randomized pause between successful operations.
    pub fn pacing_delay(&self) -> Duration {
        let min = self.config.pacing_min_seconds;
        let max = self.config.pacing_max_seconds;
        let secs = min + (max - min) * fastrand::f64();
        duration_from_secs(secs * self.pacing_scale())
    }

    /// Multiplier applied to pacing after challenges (1.0 when disabled).
    pub fn pacing_scale(&self) -> f64 {
        if !self.config.adaptive_slowdown {
            return 1.0;
        }
        let seen = self.blocked_seen.load(Ordering::Relaxed).min(MAX_EXPONENT);
        self.config
            .slowdown_factor
            .powi(seen as i32)
            .min(self.config.max_slowdown)
    }

    fn backoff_with_jitter(&self, attempt: u32, jitter: Duration) -> Duration {
        let factor = 2f64.powi(attempt.min(MAX_EXPONENT) as i32);
        let delay =
            duration_from_secs(self.config.base_backoff_seconds * factor).saturating_add(jitter);
        delay.min(self.config.max_backoff())
    }

    fn sample_jitter(&self) -> Duration {
        duration_from_secs(self.config.jitter_seconds * fastrand::f64())
    }

    fn note_blocked(&self) {
        let seen = self.blocked_seen.fetch_add(1, Ordering::Relaxed) + 1;
        if self.config.adaptive_slowdown {
            log::info!(
                "Challenge #{} observed, pacing scaled to {:.2}x",
                seen,
                self.pacing_scale()
            );
        }
    }

    async fn pause(&self) {
        let delay = self.pacing_delay();
        log::debug!("Pacing for {:.2}s", delay.as_secs_f64());
        tokio::time::sleep(delay).await;
    }
}
