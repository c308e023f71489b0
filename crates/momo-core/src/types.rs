//! Core data model: users, subscriptions, dataset rows and metrics.

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{MomoError, Result};
use crate::scope::{ScopeLevel, ScopeSelector};

/// External user identifier, trusted as given by the messaging layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Daily notification time (local to the configured zone).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotifyTime {
    hour: u8,
    minute: u8,
}

impl NotifyTime {
    /// Validate and build. Fails with `InvalidTimeRange` outside 00:00-23:59.
    pub fn new(hour: u32, minute: u32) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(MomoError::InvalidTimeRange { hour, minute });
        }
        Ok(Self {
            hour: hour as u8,
            minute: minute as u8,
        })
    }

    pub fn hour(&self) -> u32 {
        self.hour as u32
    }

    pub fn minute(&self) -> u32 {
        self.minute as u32
    }
}

impl Default for NotifyTime {
    fn default() -> Self {
        Self { hour: 12, minute: 0 }
    }
}

impl fmt::Display for NotifyTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Per-user selections and notification preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSubscription {
    pub id: UserId,
    pub selectors: BTreeSet<ScopeSelector>,
    pub auto_send_enabled: bool,
    pub notify_time: NotifyTime,
}

impl UserSubscription {
    /// Fresh subscription with no selections and auto-send off.
    pub fn new(id: UserId, notify_time: NotifyTime) -> Self {
        Self {
            id,
            selectors: BTreeSet::new(),
            auto_send_enabled: false,
            notify_time,
        }
    }

    /// Flip membership of `selector`. Returns true if it is now selected.
    pub fn toggle(&mut self, selector: ScopeSelector) -> bool {
        if self.selectors.remove(&selector) {
            false
        } else {
            self.selectors.insert(selector);
            true
        }
    }
}

/// One row of the refreshed time-series dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRecord {
    pub level: ScopeLevel,
    pub scope_name: String,
    pub date: NaiveDate,
    pub sex_code: String,
    pub age_group_code: String,
    pub observed: Option<i64>,
    pub expected: i64,
}

/// Result of resolving one selector against a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metric {
    pub date: NaiveDate,
    pub observed: i64,
    pub expected: i64,
    pub excess: i64,
}

impl Metric {
    pub fn new(date: NaiveDate, observed: i64, expected: i64) -> Self {
        Self {
            date,
            observed,
            expected,
            excess: observed.saturating_sub(expected),
        }
    }

    /// Excess with an explicit sign: `+10`, `+0`, `-5`.
    pub fn signed_excess(&self) -> String {
        if self.excess >= 0 {
            format!("+{}", self.excess)
        } else {
            self.excess.to_string()
        }
    }
}
