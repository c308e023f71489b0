//! Scheduled job definitions: one durable daily job per user.

use std::fmt;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use momo_core::{NotifyTime, UserId};

use crate::cron;

const JOB_PREFIX: &str = "daily_update_";

/// Deterministic job key derived from the user id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKey(String);

impl JobKey {
    pub fn for_user(user: &UserId) -> Self {
        Self(format!("{JOB_PREFIX}{user}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rebuild a key read from storage.
    pub fn from_stored(raw: String) -> Self {
        Self(raw)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A durable daily trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    /// Unique key, one per user.
    pub key: JobKey,
    /// Payload handed to the dispatcher.
    pub user: UserId,
    /// Local time of day of the trigger.
    pub time: NotifyTime,
    /// IANA zone the trigger is evaluated in.
    pub timezone: String,
    /// Next occurrence, kept for crash recovery.
    pub next_fire_at: DateTime<Utc>,
    /// Last occurrence that was claimed.
    pub last_fired_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledJob {
    /// Create a daily job for `user` whose first fire is after `now`.
    pub fn daily(user: &UserId, time: NotifyTime, tz: Tz, now: DateTime<Utc>) -> Self {
        Self {
            key: JobKey::for_user(user),
            user: user.clone(),
            time,
            timezone: tz.name().to_string(),
            next_fire_at: cron::next_daily_fire(time, tz, now),
            last_fired_at: None,
            created_at: now,
        }
    }

    /// Cron form of the trigger, as persisted.
    pub fn expression(&self) -> String {
        cron::daily_expression(self.time)
    }

    /// Whether this job should fire at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_fire_at
    }
}
