// ABOUTME: Daily usage quota service gating every model invocation per user
// ABOUTME: Computes the usage day from a fixed UTC cutoff and delegates atomic increments to the store
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Usage Limiter
//!
//! A usage day starts at `reset_hour_utc` rather than at midnight. With a
//! cutoff of 04:00 UTC, a call at 03:59 on the 2nd still counts toward the
//! day that started on the 1st.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeDelta, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::UsageConfig;
use crate::database::{format_timestamp, UsageManager};
use crate::errors::{AppError, AppResult};
use crate::models::{UsageDecision, UsageSnapshot};

/// The usage day containing a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsagePeriod {
    /// Calendar date the usage day started on
    pub start: NaiveDate,
    /// Instant the next usage day begins
    pub resets_at: DateTime<Utc>,
}

impl UsagePeriod {
    /// Usage day containing `now` for a cutoff at `reset_hour_utc`
    #[must_use]
    pub fn containing(now: DateTime<Utc>, reset_hour_utc: u32) -> Self {
        let reset_hour = reset_hour_utc.min(23);
        let start = (now - TimeDelta::hours(i64::from(reset_hour))).date_naive();
        let next_day = start.checked_add_days(Days::new(1)).unwrap_or(start);
        let cutoff = NaiveTime::from_hms_opt(reset_hour, 0, 0).unwrap_or(NaiveTime::MIN);

        Self {
            start,
            resets_at: next_day.and_time(cutoff).and_utc(),
        }
    }

    /// Stored key for the usage day
    #[must_use]
    pub fn key(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }
}

/// Per-user daily quota
pub struct UsageLimiter {
    store: UsageManager,
    config: UsageConfig,
}

impl UsageLimiter {
    /// Create a limiter over the usage store
    #[must_use]
    pub const fn new(store: UsageManager, config: UsageConfig) -> Self {
        Self { store, config }
    }

    /// Current usage day
    #[must_use]
    pub fn current_period(&self) -> UsagePeriod {
        UsagePeriod::containing(Utc::now(), self.config.reset_hour_utc)
    }

    /// Count for the current usage day, 0 if nothing recorded
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails
    pub async fn get_usage(&self, user_id: &str) -> AppResult<u32> {
        self.get_usage_at(user_id, Utc::now()).await
    }

    /// Count for the usage day containing `now`
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails
    pub async fn get_usage_at(&self, user_id: &str, now: DateTime<Utc>) -> AppResult<u32> {
        let period = UsagePeriod::containing(now, self.config.reset_hour_utc);
        self.store.get_count(user_id, &period.key()).await
    }

    /// Atomically count one invocation unless the limit is reached
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails
    pub async fn try_increment(&self, user_id: &str, daily_limit: u32) -> AppResult<UsageDecision> {
        self.try_increment_at(user_id, daily_limit, Utc::now())
            .await
    }

    /// [`Self::try_increment`] for the usage day containing `now`
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails
    pub async fn try_increment_at(
        &self,
        user_id: &str,
        daily_limit: u32,
        now: DateTime<Utc>,
    ) -> AppResult<UsageDecision> {
        let period = UsagePeriod::containing(now, self.config.reset_hour_utc);
        let result = self
            .store
            .increment_if_below(
                user_id,
                &period.key(),
                &format_timestamp(period.resets_at),
                daily_limit,
            )
            .await?;

        Ok(match result {
            Some(count) => {
                debug!(user_id, count, daily_limit, "Usage incremented");
                UsageDecision::Allowed { count }
            }
            None => {
                info!(user_id, daily_limit, "Daily usage limit reached");
                UsageDecision::Denied
            }
        })
    }

    /// Purge counters of usage days that have ended
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails
    pub async fn reset_expired(&self) -> AppResult<u64> {
        self.reset_expired_at(Utc::now()).await
    }

    /// [`Self::reset_expired`] relative to `now`
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails
    pub async fn reset_expired_at(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let purged = self.store.delete_expired(&format_timestamp(now)).await?;
        if purged > 0 {
            info!(purged, "Purged expired usage counters");
        }
        Ok(purged)
    }

    /// Limit for a user: override if present, configured default otherwise
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails
    pub async fn daily_limit_for(&self, user_id: &str) -> AppResult<u32> {
        Ok(self
            .store
            .get_limit_override(user_id)
            .await?
            .unwrap_or(self.config.default_daily_limit))
    }

    /// Set a per-user limit override
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails
    pub async fn set_daily_limit(&self, user_id: &str, daily_limit: u32) -> AppResult<()> {
        self.store.set_limit_override(user_id, daily_limit).await
    }

    /// Count one invocation for the user or fail with `dailyLimitExceeded`
    ///
    /// # Errors
    ///
    /// Returns `DailyLimitExceeded` when denied, or a store error
    pub async fn authorize(&self, user_id: &str) -> AppResult<u32> {
        let limit = self.daily_limit_for(user_id).await?;
        match self.try_increment(user_id, limit).await? {
            UsageDecision::Allowed { count } => Ok(count),
            UsageDecision::Denied => Err(AppError::daily_limit_exceeded(limit)),
        }
    }

    /// Usage, limit, and reset time for the current day
    ///
    /// # Errors
    ///
    /// Returns an error if a store read fails
    pub async fn snapshot(&self, user_id: &str) -> AppResult<UsageSnapshot> {
        let period = self.current_period();
        Ok(UsageSnapshot {
            count: self.store.get_count(user_id, &period.key()).await?,
            limit: self.daily_limit_for(user_id).await?,
            period_start: period.key(),
            resets_at: format_timestamp(period.resets_at),
        })
    }

    /// Run [`Self::reset_expired`] every `interval` until the task is aborted
    #[must_use]
    pub fn spawn_purge_task(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.reset_expired().await {
                    warn!(error = %e, "Usage counter purge failed");
                }
            }
        })
    }
}
