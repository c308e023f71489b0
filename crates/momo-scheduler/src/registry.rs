//! Selection Registry: durable per-user selections and preferences.
//!
//! Every operation is one atomic read-modify-write in SQLite. Operations
//! that affect auto-send then signal the job scheduler through
//! [`ScheduleHook`], which brings the user's job in line with the row.

use std::sync::Arc;

use momo_core::error::Result;
use momo_core::{NotifyTime, ScopeSelector, UserId, UserSubscription};

use crate::persistence::{JobChange, SchedulerDb};

/// Seam between the registry and the job scheduler.
pub trait ScheduleHook: Send + Sync {
    /// Make the user's job match their stored subscription: present at
    /// the stored time if auto-send is on, absent otherwise.
    fn sync(&self, user: &UserId) -> Result<JobChange>;

    /// Whether a job currently exists for the user.
    fn is_scheduled(&self, user: &UserId) -> Result<bool>;
}

/// Outcome of [`SelectionRegistry::mark_accepted`].
#[derive(Debug, Clone)]
pub struct Acceptance {
    pub subscription: UserSubscription,
    /// True when this call switched auto-send on.
    pub newly_enabled: bool,
}

pub struct SelectionRegistry {
    db: Arc<SchedulerDb>,
    hook: Arc<dyn ScheduleHook>,
    default_time: NotifyTime,
}

impl SelectionRegistry {
    pub fn new(db: Arc<SchedulerDb>, hook: Arc<dyn ScheduleHook>, default_time: NotifyTime) -> Self {
        Self {
            db,
            hook,
            default_time,
        }
    }

    /// Current subscription; created with defaults on first access.
    pub fn get(&self, user: &UserId) -> Result<UserSubscription> {
        self.db.subscription(user, self.default_time)
    }

    /// Add `selector` if absent, remove it if present.
    pub fn toggle(&self, user: &UserId, selector: ScopeSelector) -> Result<UserSubscription> {
        let (sub, selected) = self
            .db
            .update_subscription(user, self.default_time, |s| Ok(s.toggle(selector.clone())))?;
        tracing::debug!(
            "{} {} for user {user}",
            if selected { "➕ Selected" } else { "➖ Deselected" },
            selector
        );
        Ok(sub)
    }

    /// Empty the selections, switch auto-send off and cancel the job.
    /// The row itself is kept.
    pub fn clear(&self, user: &UserId) -> Result<UserSubscription> {
        let (sub, ()) = self.db.update_subscription(user, self.default_time, |s| {
            s.selectors.clear();
            s.auto_send_enabled = false;
            Ok(())
        })?;
        self.hook.sync(user)?;
        tracing::info!("🗑️ Cleared selections for user {user}");
        Ok(sub)
    }

    /// Change the daily time. Out-of-range values fail with
    /// `InvalidTimeRange` and leave the subscription untouched.
    pub fn set_notify_time(&self, user: &UserId, hour: u32, minute: u32) -> Result<UserSubscription> {
        let time = NotifyTime::new(hour, minute)?;
        let (sub, ()) = self.db.update_subscription(user, self.default_time, |s| {
            s.notify_time = time;
            Ok(())
        })?;
        if sub.auto_send_enabled {
            self.hook.sync(user)?;
            tracing::info!("⏰ User {user} rescheduled to {time}");
        }
        Ok(sub)
    }

    /// Switch auto-send on (if needed) and (re)schedule the daily job.
    pub fn mark_accepted(&self, user: &UserId) -> Result<Acceptance> {
        let (subscription, newly_enabled) =
            self.db.update_subscription(user, self.default_time, |s| {
                let was = s.auto_send_enabled;
                s.auto_send_enabled = true;
                Ok(!was)
            })?;
        self.hook.sync(user)?;
        if newly_enabled {
            tracing::info!(
                "✅ Auto-send enabled for user {user} at {}",
                subscription.notify_time
            );
        }
        Ok(Acceptance {
            subscription,
            newly_enabled,
        })
    }

    /// Switch auto-send off and cancel the job, keeping selections.
    /// Returns whether auto-send was on.
    pub fn disable_auto_send(&self, user: &UserId) -> Result<bool> {
        let (_, was) = self.db.update_subscription(user, self.default_time, |s| {
            let was = s.auto_send_enabled;
            s.auto_send_enabled = false;
            Ok(was)
        })?;
        self.hook.sync(user)?;
        Ok(was)
    }

    /// Re-create a missing job for an enabled subscription.
    /// Returns true if a job had to be created.
    pub fn ensure_scheduled(&self, user: &UserId) -> Result<bool> {
        let sub = self.get(user)?;
        if !sub.auto_send_enabled || self.hook.is_scheduled(user)? {
            return Ok(false);
        }
        tracing::info!("🔧 Restoring missing job for user {user}");
        self.hook.sync(user)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use momo_core::MomoError;

    /// Records sync calls and mirrors the subscription into a fake job flag.
    struct RecordingHook {
        db: Arc<SchedulerDb>,
        calls: Mutex<Vec<(String, bool)>>,
    }

    impl ScheduleHook for RecordingHook {
        fn sync(&self, user: &UserId) -> Result<JobChange> {
            let enabled = self.db.subscription(user, NotifyTime::default())?.auto_send_enabled;
            self.calls.lock().unwrap().push((user.to_string(), enabled));
            Ok(JobChange::Unchanged)
        }

        fn is_scheduled(&self, user: &UserId) -> Result<bool> {
            Ok(self
                .calls
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(u, _)| u == user.as_str())
                .is_some_and(|(_, on)| *on))
        }
    }

    fn setup() -> (SelectionRegistry, Arc<RecordingHook>) {
        let db = Arc::new(SchedulerDb::open_in_memory().unwrap());
        let hook = Arc::new(RecordingHook {
            db: db.clone(),
            calls: Mutex::new(Vec::new()),
        });
        let reg = SelectionRegistry::new(db, hook.clone(), NotifyTime::default());
        (reg, hook)
    }

    #[test]
    fn test_toggle_twice_restores() {
        let (reg, hook) = setup();
        let u = UserId::from(1);
        reg.toggle(&u, ScopeSelector::National).unwrap();
        let before = reg.get(&u).unwrap().selectors;
        reg.toggle(&u, ScopeSelector::Region("Madrid".into())).unwrap();
        let after = reg.toggle(&u, ScopeSelector::Region("Madrid".into())).unwrap();
        assert_eq!(after.selectors, before);
        assert!(hook.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_set_time_rejects_out_of_range() {
        let (reg, _) = setup();
        let u = UserId::from(1);
        reg.set_notify_time(&u, 8, 30).unwrap();
        let err = reg.set_notify_time(&u, 25, 0).unwrap_err();
        assert!(matches!(err, MomoError::InvalidTimeRange { hour: 25, minute: 0 }));
        assert_eq!(reg.get(&u).unwrap().notify_time.to_string(), "08:30");
    }

    #[test]
    fn test_set_time_only_signals_when_enabled() {
        let (reg, hook) = setup();
        let u = UserId::from(1);
        reg.set_notify_time(&u, 9, 0).unwrap();
        assert!(hook.calls.lock().unwrap().is_empty());
        reg.mark_accepted(&u).unwrap();
        reg.set_notify_time(&u, 10, 0).unwrap();
        assert_eq!(hook.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_accept_is_idempotent_but_always_signals() {
        let (reg, hook) = setup();
        let u = UserId::from(1);
        assert!(reg.mark_accepted(&u).unwrap().newly_enabled);
        assert!(!reg.mark_accepted(&u).unwrap().newly_enabled);
        assert_eq!(hook.calls.lock().unwrap().len(), 2);
        assert!(reg.get(&u).unwrap().auto_send_enabled);
    }

    #[test]
    fn test_clear_resets_row() {
        let (reg, hook) = setup();
        let u = UserId::from(1);
        reg.toggle(&u, ScopeSelector::National).unwrap();
        reg.set_notify_time(&u, 7, 0).unwrap();
        reg.mark_accepted(&u).unwrap();
        let sub = reg.clear(&u).unwrap();
        assert!(sub.selectors.is_empty());
        assert!(!sub.auto_send_enabled);
        // notify time is a preference and survives a clear
        assert_eq!(sub.notify_time.to_string(), "07:00");
        assert_eq!(hook.calls.lock().unwrap().last(), Some(&("1".to_string(), false)));
    }

    #[test]
    fn test_ensure_scheduled() {
        let (reg, _) = setup();
        let u = UserId::from(1);
        assert!(!reg.ensure_scheduled(&u).unwrap());
        reg.mark_accepted(&u).unwrap();
        assert!(!reg.ensure_scheduled(&u).unwrap());
    }
}
