//! Eviction of finished jobs from the registry.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;

use super::model::{Job, JobId};
use crate::config::QueueConfig;

/// How long terminal jobs stay pollable after they finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// `None` keeps finished jobs forever
    pub ttl: Option<Duration>,
    pub sweep_interval: Duration,
}

impl RetentionPolicy {
    /// Whether a job must leave the registry at `now`.
    ///
    /// Jobs that are pending or running are never expired.
    pub fn is_expired(&self, job: &Job, now: DateTime<Utc>) -> bool {
        let (Some(ttl), Some(completed_at)) = (self.ttl, job.completed_at()) else {
            return false;
        };
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);

        job.is_terminal()
            && completed_at
                .checked_add_signed(ttl)
                .is_some_and(|expires_at| expires_at <= now)
    }

    /// Drop expired jobs, returning how many were removed.
    pub(crate) fn evict(&self, registry: &DashMap<JobId, Job>, now: DateTime<Utc>) -> usize {
        if self.ttl.is_none() {
            return 0;
        }

        let before = registry.len();
        registry.retain(|_, job| !self.is_expired(job, now));
        before.saturating_sub(registry.len())
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

impl From<&QueueConfig> for RetentionPolicy {
    fn from(config: &QueueConfig) -> Self {
        Self {
            ttl: (config.retention_secs > 0).then(|| Duration::from_secs(config.retention_secs)),
            sweep_interval: Duration::from_secs(config.cleanup_interval_secs.max(1)),
        }
    }
}
