//! Global sliding-window admission control for outbound fetches.
//!
//! One [`RateLimiter`] is shared by every job the engine runs. Each fetch
//! must first [`acquire`](RateLimiter::acquire) a [`Permit`]; at most
//! `limit` permits are granted within any `window`-long interval. Permits
//! are never returned: each one simply ages out of the window `window`
//! after it was granted, so the limiter bounds fetch *starts*, not fetches
//! in flight.
//!
//! Accounting is an admission log (timestamps of recent grants) guarded by
//! a tokio mutex. The check-and-record step happens under the lock, so
//! concurrent callers can never over-admit. Waiting callers sleep until the
//! oldest grant expires and then re-check; waiting never holds the lock.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::AppError;

/// Window and limit of the shared rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Length of the sliding window, in milliseconds.
    pub window_ms: u64,
    /// Maximum fetch starts within any window.
    pub limit: u32,
}

impl RateLimitConfig {
    /// The window has millisecond granularity. Fractions round up, so a
    /// sub-millisecond window becomes 1ms; oversized windows saturate.
    pub fn new(window: Duration, limit: u32) -> Self {
        let mut millis = window.as_millis();
        if window.subsec_nanos() % 1_000_000 != 0 {
            millis += 1;
        }
        Self {
            window_ms: u64::try_from(millis).unwrap_or(u64::MAX),
            limit,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.limit == 0 {
            return Err(AppError::ConfigError(
                "rate_limiter.limit must be at least 1".into(),
            ));
        }
        if self.window_ms == 0 {
            return Err(AppError::ConfigError(
                "rate_limiter.window_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for RateLimitConfig {
    /// Two fetch starts per second.
    fn default() -> Self {
        Self {
            window_ms: 1000,
            limit: 2,
        }
    }
}

/// Admission granted by the [`RateLimiter`] for one fetch.
#[derive(Debug, Clone, Copy)]
pub struct Permit {
    granted_at: Instant,
    expires_at: Instant,
}

impl Permit {
    pub fn granted_at(&self) -> Instant {
        self.granted_at
    }

    /// When this permit stops counting against the window.
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    limit: usize,
    /// Grant times still inside the window, oldest first.
    admissions: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Result<Self, AppError> {
        config.validate()?;
        Ok(Self {
            window: config.window(),
            limit: config.limit as usize,
            admissions: Mutex::new(VecDeque::with_capacity(config.limit as usize)),
        })
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Wait until a fetch may start, then record the grant.
    ///
    /// Cancel-safe: dropping the future before it resolves records nothing.
    pub async fn acquire(&self) -> Permit {
        loop {
            let wake_at = match self.try_admit().await {
                Ok(permit) => return permit,
                Err(wake_at) => wake_at,
            };
            tracing::debug!(
                wait_ms = %wake_at.saturating_duration_since(Instant::now()).as_millis(),
                limit = self.limit,
                "Rate limit reached, waiting for a slot"
            );
            tokio::time::sleep_until(wake_at).await;
        }
    }

    /// Grant a permit only if one is available right now.
    pub async fn try_acquire(&self) -> Option<Permit> {
        self.try_admit().await.ok()
    }

    /// Number of grants still counting against the current window.
    pub async fn in_window(&self) -> usize {
        let mut admissions = self.admissions.lock().await;
        self.prune(&mut admissions, Instant::now());
        admissions.len()
    }

    /// Admit now, or return the instant at which the next slot frees.
    async fn try_admit(&self) -> Result<Permit, Instant> {
        let mut admissions = self.admissions.lock().await;
        let now = Instant::now();
        self.prune(&mut admissions, now);

        if admissions.len() < self.limit {
            admissions.push_back(now);
            return Ok(Permit {
                granted_at: now,
                expires_at: now + self.window,
            });
        }

        Err(admissions
            .front()
            .map(|&oldest| oldest + self.window)
            .unwrap_or(now))
    }

    fn prune(&self, admissions: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = admissions.front() {
            if now.duration_since(oldest) >= self.window {
                admissions.pop_front();
            } else {
                break;
            }
        }
    }
}
