use crate::error::ProviderError;
use chrono::{NaiveDate, Utc};
use std::sync::Mutex;
use std::time::Instant;

/// Local enforcement of an external provider's request quota.
///
/// A token bucket covers the per-minute rate and a rolling counter covers the
/// daily cap. Acquisition is fail-fast: an exhausted budget yields a
/// quota-exceeded transient error instead of issuing (and billing) the call.
/// Safe under concurrent access from simultaneous resolutions.
pub struct RateBudget {
    provider: &'static str,
    per_min: Option<u64>,
    per_day: Option<u64>,
    // (current tokens, time of last refill)
    bucket: Mutex<(f64, Instant)>,
    // (calls today, which day that counts for)
    daily: Mutex<(u64, NaiveDate)>,
}

impl RateBudget {
    pub fn new(provider: &'static str, per_min: Option<u64>, per_day: Option<u64>) -> Self {
        Self {
            provider,
            per_min,
            per_day,
            bucket: Mutex::new((per_min.unwrap_or(0) as f64, Instant::now())),
            daily: Mutex::new((0, Utc::now().date_naive())),
        }
    }

    /// Unlimited budget, used by tests and self-hosted providers.
    pub fn unlimited(provider: &'static str) -> Self {
        Self::new(provider, None, None)
    }

    /// Take one call out of the budget, or fail fast without issuing it.
    /// Both limits are checked before either is charged: a call rejected by
    /// the daily cap does not drain the minute bucket, and vice versa.
    pub fn try_acquire(&self) -> Result<(), ProviderError> {
        // lock order is bucket then daily, everywhere
        let mut bucket = self.bucket.lock().unwrap();
        let mut daily = self.daily.lock().unwrap();

        if let Some(capacity) = self.per_min {
            let (ref mut tokens, ref mut last) = *bucket;
            let now = Instant::now();
            let elapsed = now.duration_since(*last).as_secs_f64();
            let refill_rate = capacity as f64 / 60.0;
            *tokens = (*tokens + elapsed * refill_rate).min(capacity as f64);
            *last = now;
        }
        if let Some(cap) = self.per_day {
            let (ref mut count, ref mut day) = *daily;
            let today = Utc::now().date_naive();
            if *day != today {
                *count = 0;
                *day = today;
            }
            if *count >= cap {
                return Err(ProviderError::QuotaExceeded(format!(
                    "{} exceeded {} requests/day",
                    self.provider, cap
                )));
            }
        }
        if let Some(capacity) = self.per_min {
            if bucket.0 < 1.0 {
                return Err(ProviderError::QuotaExceeded(format!(
                    "{} exceeded {} requests/min",
                    self.provider, capacity
                )));
            }
        }

        if self.per_min.is_some() {
            bucket.0 -= 1.0;
        }
        if self.per_day.is_some() {
            daily.0 += 1;
        }
        Ok(())
    }
}
