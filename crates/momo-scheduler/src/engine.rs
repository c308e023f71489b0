//! Job Scheduler: durable daily triggers, one per user.
//! Uses tokio::interval for ticking; each due job is claimed in SQLite
//! before it fires so a restart never replays an occurrence that was
//! already handed to the dispatcher.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use momo_core::error::Result;
use momo_core::{NotifyTime, UserId, UserSubscription};

use crate::cron;
use crate::jobs::{JobKey, ScheduledJob};
use crate::persistence::{JobChange, SchedulerDb};
use crate::registry::ScheduleHook;

/// Counts produced by [`JobScheduler::reconcile_on_startup`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Jobs that did not exist and were created.
    pub created: usize,
    /// Jobs whose stored trigger disagreed with the subscription.
    pub corrected: usize,
    /// Jobs that already matched.
    pub kept: usize,
    /// Jobs with no enabled subscription behind them.
    pub removed: usize,
}

pub struct JobScheduler {
    db: Arc<SchedulerDb>,
    tz: Tz,
    default_time: NotifyTime,
}

impl JobScheduler {
    pub fn new(db: Arc<SchedulerDb>, tz: Tz, default_time: NotifyTime) -> Self {
        Self {
            db,
            tz,
            default_time,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Create or replace the user's daily job. Replacement is a single
    /// row write, so there is no moment with zero or two triggers.
    pub fn upsert(&self, user: &UserId, time: NotifyTime) -> Result<ScheduledJob> {
        let job = ScheduledJob::daily(user, time, self.tz, Utc::now());
        self.db.upsert_job(&job)?;
        tracing::debug!(
            "📅 Job '{}' armed ({}), next at {}",
            job.key,
            job.expression(),
            job.next_fire_at
        );
        Ok(job)
    }

    /// Remove a job. Cancelling an unknown key is not an error.
    pub fn cancel(&self, key: &JobKey) -> Result<bool> {
        let removed = self.db.delete_job(key)?;
        if removed {
            tracing::info!("🛑 Job '{key}' cancelled");
        }
        Ok(removed)
    }

    pub fn job(&self, key: &JobKey) -> Result<Option<ScheduledJob>> {
        self.db.load_job(key)
    }

    pub fn jobs(&self) -> Result<Vec<ScheduledJob>> {
        self.db.load_jobs()
    }

    pub fn due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>> {
        Ok(self
            .db
            .load_jobs()?
            .into_iter()
            .filter(|j| j.is_due(now))
            .collect())
    }

    /// Rebuild every trigger from the subscription table.
    ///
    /// Subscriptions are authoritative: a stored job at another time or in
    /// another zone is rewritten, a job whose next fire already passed
    /// while the process was down is moved to its next occurrence, and a
    /// job with no enabled subscription is dropped.
    pub fn reconcile_on_startup(&self, subscriptions: &[UserSubscription]) -> Result<ReconcileReport> {
        let now = Utc::now();
        let mut report = ReconcileReport::default();
        let mut keep = HashSet::new();

        for sub in subscriptions.iter().filter(|s| s.auto_send_enabled) {
            let key = JobKey::for_user(&sub.id);
            match self.db.load_job(&key)? {
                Some(job)
                    if job.time == sub.notify_time
                        && job.timezone == self.tz.name()
                        && job.next_fire_at > now =>
                {
                    report.kept += 1;
                }
                Some(_) => {
                    self.upsert(&sub.id, sub.notify_time)?;
                    report.corrected += 1;
                }
                None => {
                    self.upsert(&sub.id, sub.notify_time)?;
                    report.created += 1;
                }
            }
            keep.insert(key);
        }

        report.removed = self.db.retain_jobs(&keep)?;
        tracing::info!(
            "🔄 Reconciled jobs: {} created, {} corrected, {} kept, {} removed",
            report.created,
            report.corrected,
            report.kept,
            report.removed
        );
        Ok(report)
    }

    /// Claim every job due at `now` by moving it to its next occurrence.
    /// Only jobs this call managed to advance are returned.
    pub fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>> {
        let mut claimed = Vec::new();
        for job in self.due_jobs(now)? {
            let tz = job.timezone.parse::<Tz>().unwrap_or(self.tz);
            let next = cron::next_daily_fire(job.time, tz, now);
            if self.db.advance_job(&job.key, job.next_fire_at, next, now)? {
                claimed.push(job);
            } else {
                tracing::debug!("Job '{}' changed before it could be claimed", job.key);
            }
        }
        Ok(claimed)
    }
}

impl ScheduleHook for JobScheduler {
    fn sync(&self, user: &UserId) -> Result<JobChange> {
        let tz = self.tz;
        let change = self.db.sync_job(user, self.default_time, |sub| {
            sub.auto_send_enabled
                .then(|| ScheduledJob::daily(user, sub.notify_time, tz, Utc::now()))
        })?;
        match &change {
            JobChange::Scheduled(job) => tracing::debug!(
                "📅 Job '{}' armed ({}), next at {}",
                job.key,
                job.expression(),
                job.next_fire_at
            ),
            JobChange::Cancelled => tracing::info!("🛑 Job for user {user} cancelled"),
            JobChange::Unchanged => {}
        }
        Ok(change)
    }

    fn is_scheduled(&self, user: &UserId) -> Result<bool> {
        Ok(self.db.load_job(&JobKey::for_user(user))?.is_some())
    }
}

/// Spawn the scheduler loop as a background tokio task body.
///
/// `on_fire` is called once per claimed occurrence, each in its own task,
/// so a slow or failing user never delays the others.
pub async fn spawn_scheduler<F, Fut>(scheduler: Arc<JobScheduler>, on_fire: F, tick_secs: u64)
where
    F: Fn(UserId) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tracing::info!(
        "⏰ Scheduler started (check every {}s, zone {})",
        tick_secs,
        scheduler.timezone()
    );

    let mut interval = tokio::time::interval(std::time::Duration::from_secs(tick_secs.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let claimed = match scheduler.claim_due(Utc::now()) {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!("❌ Scheduler tick failed: {e}");
                continue;
            }
        };

        for job in claimed {
            tracing::info!("📣 Firing '{}' for user {}", job.key, job.user);
            let user = job.user.clone();
            let fut = on_fire(job.user);
            tokio::spawn(async move {
                if let Err(e) = fut.await {
                    tracing::warn!("⚠️ Fire failed for user {user}: {e}");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use chrono_tz::Europe::Madrid;

    fn t(h: u32, m: u32) -> NotifyTime {
        NotifyTime::new(h, m).unwrap()
    }

    fn scheduler() -> (JobScheduler, Arc<SchedulerDb>) {
        let db = Arc::new(SchedulerDb::open_in_memory().unwrap());
        (JobScheduler::new(db.clone(), Madrid, t(12, 0)), db)
    }

    fn enabled(id: i64, time: NotifyTime) -> UserSubscription {
        let mut sub = UserSubscription::new(UserId::from(id), time);
        sub.auto_send_enabled = true;
        sub
    }

    #[test]
    fn test_upsert_replaces() {
        let (s, _) = scheduler();
        let u = UserId::from(1);
        s.upsert(&u, t(8, 0)).unwrap();
        s.upsert(&u, t(21, 45)).unwrap();
        let jobs = s.jobs().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].time, t(21, 45));
        assert_eq!(jobs[0].expression(), "45 21 * * *");
    }

    #[test]
    fn test_cancel_missing_is_noop() {
        let (s, _) = scheduler();
        let key = JobKey::for_user(&UserId::from(9));
        assert!(!s.cancel(&key).unwrap());
        s.upsert(&UserId::from(9), t(8, 0)).unwrap();
        assert!(s.cancel(&key).unwrap());
        assert!(s.job(&key).unwrap().is_none());
    }

    #[test]
    fn test_reconcile_creates_missing_job() {
        let (s, _) = scheduler();
        let report = s.reconcile_on_startup(&[enabled(1, t(7, 30))]).unwrap();
        assert_eq!(report.created, 1);
        let job = s.job(&JobKey::for_user(&UserId::from(1))).unwrap().unwrap();
        assert_eq!(job.time, t(7, 30));
        assert_eq!(s.jobs().unwrap().len(), 1);
    }

    #[test]
    fn test_reconcile_corrects_stale_job() {
        let (s, _) = scheduler();
        s.upsert(&UserId::from(1), t(9, 0)).unwrap();
        let report = s.reconcile_on_startup(&[enabled(1, t(18, 15))]).unwrap();
        assert_eq!(report.corrected, 1);
        let jobs = s.jobs().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].time, t(18, 15));
    }

    #[test]
    fn test_reconcile_keeps_matching_and_drops_orphans() {
        let (s, _) = scheduler();
        s.upsert(&UserId::from(1), t(9, 0)).unwrap();
        s.upsert(&UserId::from(2), t(10, 0)).unwrap();
        let disabled = UserSubscription::new(UserId::from(2), t(10, 0));
        let report = s
            .reconcile_on_startup(&[enabled(1, t(9, 0)), disabled])
            .unwrap();
        assert_eq!(report.kept, 1);
        assert_eq!(report.removed, 1);
        assert_eq!(s.jobs().unwrap().len(), 1);
    }

    #[test]
    fn test_claim_due_advances_once() {
        let (s, _) = scheduler();
        let job = s.upsert(&UserId::from(1), t(12, 0)).unwrap();
        let at = job.next_fire_at;

        assert!(s.claim_due(at - Duration::seconds(1)).unwrap().is_empty());
        let claimed = s.claim_due(at).unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].user, UserId::from(1));

        // Second tick in the same window finds nothing.
        assert!(s.claim_due(at + Duration::seconds(5)).unwrap().is_empty());
        let stored = s.job(&job.key).unwrap().unwrap();
        assert_eq!(stored.next_fire_at, cron::next_daily_fire(t(12, 0), Madrid, at));
        assert_eq!(stored.last_fired_at, Some(at));
    }

    #[test]
    fn test_hook_follows_subscription() {
        let (s, db) = scheduler();
        let u = UserId::from(5);
        assert!(matches!(s.sync(&u).unwrap(), JobChange::Unchanged));
        assert!(!s.is_scheduled(&u).unwrap());

        db.update_subscription(&u, t(12, 0), |sub| {
            sub.auto_send_enabled = true;
            sub.notify_time = t(6, 5);
            Ok(())
        })
        .unwrap();
        match s.sync(&u).unwrap() {
            JobChange::Scheduled(job) => assert_eq!(job.time, t(6, 5)),
            other => panic!("expected a job, got {other:?}"),
        }
        assert!(s.is_scheduled(&u).unwrap());

        db.update_subscription(&u, t(12, 0), |sub| {
            sub.auto_send_enabled = false;
            Ok(())
        })
        .unwrap();
        assert!(matches!(s.sync(&u).unwrap(), JobChange::Cancelled));
        assert!(!s.is_scheduled(&u).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_fires_due_job_once() {
        let (s, db) = scheduler();
        let s = Arc::new(s);
        let due = UserId::from(1);
        let mut job = ScheduledJob::daily(&due, t(12, 0), Madrid, Utc::now());
        job.next_fire_at = Utc::now() - Duration::minutes(1);
        db.upsert_job(&job).unwrap();
        s.upsert(&UserId::from(2), t(12, 0)).unwrap();

        let fired = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = fired.clone();
        let handle = tokio::spawn(spawn_scheduler(
            s.clone(),
            move |user| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(user);
                    Ok(())
                }
            },
            20,
        ));

        // Several ticks pass; the claimed job must not fire again.
        tokio::time::sleep(std::time::Duration::from_secs(100)).await;
        handle.abort();

        assert_eq!(*fired.lock().unwrap(), vec![due.clone()]);
        let stored = s.job(&JobKey::for_user(&due)).unwrap().unwrap();
        assert!(stored.next_fire_at > Utc::now());
        assert!(stored.last_fired_at.is_some());
    }
}
