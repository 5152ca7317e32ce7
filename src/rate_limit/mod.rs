//! Shared rate limit and API metadata state.

use crate::types::{ApiInfo, RateLimit};
use chrono::Utc;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// What the tracker last recorded. Both fields are replaced in one write.
#[derive(Debug, Clone, Default)]
pub struct TrackedState {
    /// Metadata of the latest response.
    pub api_info: Option<Arc<ApiInfo>>,
    /// Latest rate limit snapshot.
    pub rate_limit: Option<RateLimit>,
}

/// Latest API metadata seen on any response.
///
/// Owned by a connection and shared by every call made through it. Each
/// response replaces the stored snapshot wholesale; when responses race, the
/// last write wins.
#[derive(Debug)]
pub struct RateLimitTracker {
    state: RwLock<TrackedState>,
    buffer_percentage: f64,
}

impl RateLimitTracker {
    /// Creates a new rate limit tracker.
    pub fn new(buffer_percentage: f64) -> Self {
        Self {
            state: RwLock::new(TrackedState::default()),
            buffer_percentage,
        }
    }

    /// Records the metadata of a response.
    ///
    /// The rate limit snapshot is only replaced by responses that carry rate
    /// limit headers.
    pub fn update(&self, info: &ApiInfo) {
        let api_info = Arc::new(info.clone());
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(rate_limit) = info.rate_limit {
            state.rate_limit = Some(rate_limit);
        }
        state.api_info = Some(api_info);
    }

    /// Reads the metadata and rate limit snapshot together.
    pub fn state(&self) -> TrackedState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Gets the metadata of the latest response.
    pub fn last_api_info(&self) -> Option<Arc<ApiInfo>> {
        self.state().api_info
    }

    /// Gets the latest rate limit snapshot.
    pub fn rate_limit(&self) -> Option<RateLimit> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .rate_limit
    }

    /// Gets the remaining requests, if known.
    pub fn remaining(&self) -> Option<u32> {
        self.rate_limit().map(|r| r.remaining)
    }

    /// Checks if callers should throttle before the quota runs out.
    pub fn should_throttle(&self) -> bool {
        match self.rate_limit() {
            Some(rate_limit) if rate_limit.limit > 0 => {
                let threshold = rate_limit.limit as f64 * self.buffer_percentage;
                rate_limit.remaining as f64 <= threshold
            }
            Some(rate_limit) => rate_limit.remaining == 0,
            None => false,
        }
    }

    /// Time to wait for the window to reset, when the quota is exhausted.
    pub fn wait_time(&self) -> Option<Duration> {
        let rate_limit = self.rate_limit()?;
        if rate_limit.remaining > 0 {
            return None;
        }

        let now = Utc::now();
        if rate_limit.reset > now {
            Some((rate_limit.reset - now).to_std().unwrap_or(Duration::ZERO))
        } else {
            None
        }
    }

    /// Forgets everything recorded so far.
    pub fn reset(&self) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = TrackedState::default();
    }
}

impl Default for RateLimitTracker {
    fn default() -> Self {
        Self::new(0.1)
    }
}
