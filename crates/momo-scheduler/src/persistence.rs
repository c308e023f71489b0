//! SQLite-backed persistence for subscriptions and scheduled jobs.
//! Survives restarts; every per-user mutation is a single IMMEDIATE
//! transaction so concurrent button presses never lose updates.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use momo_core::error::{MomoError, Result};
use momo_core::{NotifyTime, ScopeSelector, UserId, UserSubscription};

use crate::cron;
use crate::jobs::{JobKey, ScheduledJob};

/// What a job sync did to the `scheduled_jobs` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobChange {
    Scheduled(ScheduledJob),
    Cancelled,
    Unchanged,
}

/// SQLite-backed store for all scheduler data.
pub struct SchedulerDb {
    conn: Mutex<Connection>,
}

impl SchedulerDb {
    /// Open or create the database file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| MomoError::db("DB open", e))?;
        // WAL keeps readers off the writer's back
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        Self::with_connection(conn)
    }

    /// Private in-memory database (tests, dry runs).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| MomoError::db("DB open", e))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.lock()?
            .execute_batch(
                "
            -- One row per user, never deleted
            CREATE TABLE IF NOT EXISTS subscriptions (
                user_id TEXT PRIMARY KEY,
                selectors TEXT NOT NULL DEFAULT '[]',   -- JSON array of selector tokens
                auto_send INTEGER NOT NULL DEFAULT 0,
                notify_hour INTEGER NOT NULL DEFAULT 12,
                notify_minute INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- One daily job per user, keyed deterministically
            CREATE TABLE IF NOT EXISTS scheduled_jobs (
                job_key TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                cron_expr TEXT NOT NULL,                -- daily cron: 'MIN HOUR * * *'
                timezone TEXT NOT NULL,
                next_fire_at TEXT NOT NULL,
                last_fired_at TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_next_fire ON scheduled_jobs(next_fire_at);
            CREATE INDEX IF NOT EXISTS idx_subscriptions_auto_send ON subscriptions(auto_send);
         ",
            )
            .map_err(|e| MomoError::db("Migration", e))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| MomoError::db("Lock", e))
    }

    // ─── Subscriptions ──────────────────────────────────────

    /// Read a subscription, creating it with defaults on first access.
    pub fn subscription(&self, user: &UserId, defaults: NotifyTime) -> Result<UserSubscription> {
        let conn = self.lock()?;
        insert_default(&conn, user, defaults)?;
        read_subscription(&conn, user, defaults)
    }

    /// Atomic read-modify-write of one subscription.
    ///
    /// `f` runs inside the transaction; an `Err` from it rolls back and
    /// leaves the row untouched.
    pub fn update_subscription<T, F>(
        &self,
        user: &UserId,
        defaults: NotifyTime,
        f: F,
    ) -> Result<(UserSubscription, T)>
    where
        F: FnOnce(&mut UserSubscription) -> Result<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| MomoError::db("Begin", e))?;

        insert_default(&tx, user, defaults)?;
        let mut sub = read_subscription(&tx, user, defaults)?;
        let out = f(&mut sub)?;
        write_subscription(&tx, &sub)?;

        tx.commit().map_err(|e| MomoError::db("Commit", e))?;
        Ok((sub, out))
    }

    /// All subscriptions with auto-send enabled. `defaults` stands in for
    /// a stored time that no longer validates.
    pub fn enabled_subscriptions(&self, defaults: NotifyTime) -> Result<Vec<UserSubscription>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT user_id, selectors, auto_send, notify_hour, notify_minute
                 FROM subscriptions WHERE auto_send = 1 ORDER BY user_id",
            )
            .map_err(|e| MomoError::db("Prepare", e))?;
        let rows = stmt
            .query_map([], raw_subscription)
            .map_err(|e| MomoError::db("Load subscriptions", e))?;
        Ok(rows.filter_map(|r| r.ok()).map(|raw| into_subscription(raw, defaults)).collect())
    }

    // ─── Scheduled Jobs ──────────────────────────────────────

    /// Insert or atomically replace the job under its key.
    pub fn upsert_job(&self, job: &ScheduledJob) -> Result<()> {
        let conn = self.lock()?;
        write_job(&conn, job)
    }

    /// Delete a job. Returns false if there was none.
    pub fn delete_job(&self, key: &JobKey) -> Result<bool> {
        let n = self
            .lock()?
            .execute("DELETE FROM scheduled_jobs WHERE job_key = ?1", [key.as_str()])
            .map_err(|e| MomoError::db("Delete job", e))?;
        Ok(n > 0)
    }

    pub fn load_job(&self, key: &JobKey) -> Result<Option<ScheduledJob>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("{JOB_COLUMNS} WHERE job_key = ?1"),
                [key.as_str()],
                raw_job,
            )
            .optional()
            .map_err(|e| MomoError::db("Load job", e))?;
        Ok(raw.and_then(into_job))
    }

    /// Load all jobs. Rows that fail to decode are skipped.
    pub fn load_jobs(&self) -> Result<Vec<ScheduledJob>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("{JOB_COLUMNS} ORDER BY job_key"))
            .map_err(|e| MomoError::db("Prepare", e))?;
        let rows = stmt
            .query_map([], raw_job)
            .map_err(|e| MomoError::db("Load jobs", e))?;
        Ok(rows.filter_map(|r| r.ok()).filter_map(into_job).collect())
    }

    /// Move a job to its next occurrence, but only if it still has the
    /// `expected` fire time. Returns false if the job was replaced or
    /// cancelled in the meantime.
    pub fn advance_job(
        &self,
        key: &JobKey,
        expected: DateTime<Utc>,
        next: DateTime<Utc>,
        fired_at: DateTime<Utc>,
    ) -> Result<bool> {
        let n = self
            .lock()?
            .execute(
                "UPDATE scheduled_jobs SET next_fire_at = ?1, last_fired_at = ?2
                 WHERE job_key = ?3 AND next_fire_at = ?4",
                params![
                    next.to_rfc3339(),
                    fired_at.to_rfc3339(),
                    key.as_str(),
                    expected.to_rfc3339()
                ],
            )
            .map_err(|e| MomoError::db("Advance job", e))?;
        Ok(n > 0)
    }

    /// Delete every job whose key is not in `keep`. Returns how many went.
    pub fn retain_jobs(&self, keep: &HashSet<JobKey>) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| MomoError::db("Begin", e))?;

        let stale: Vec<String> = {
            let mut stmt = tx
                .prepare("SELECT job_key FROM scheduled_jobs")
                .map_err(|e| MomoError::db("Prepare", e))?;
            let keys = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|e| MomoError::db("Load job keys", e))?;
            keys.filter_map(|k| k.ok())
                .filter(|k| !keep.contains(&JobKey::from_stored(k.clone())))
                .collect()
        };
        for key in &stale {
            tx.execute("DELETE FROM scheduled_jobs WHERE job_key = ?1", [key])
                .map_err(|e| MomoError::db("Delete job", e))?;
        }

        tx.commit().map_err(|e| MomoError::db("Commit", e))?;
        Ok(stale.len())
    }

    /// Make the user's job match their subscription in one transaction.
    ///
    /// `plan` sees the committed subscription and returns the job that
    /// should exist, or `None` for no job.
    pub fn sync_job<F>(&self, user: &UserId, defaults: NotifyTime, plan: F) -> Result<JobChange>
    where
        F: FnOnce(&UserSubscription) -> Option<ScheduledJob>,
    {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| MomoError::db("Begin", e))?;

        insert_default(&tx, user, defaults)?;
        let sub = read_subscription(&tx, user, defaults)?;
        let change = match plan(&sub) {
            Some(job) => {
                write_job(&tx, &job)?;
                JobChange::Scheduled(job)
            }
            None => {
                let n = tx
                    .execute(
                        "DELETE FROM scheduled_jobs WHERE job_key = ?1",
                        [JobKey::for_user(user).as_str()],
                    )
                    .map_err(|e| MomoError::db("Delete job", e))?;
                if n > 0 { JobChange::Cancelled } else { JobChange::Unchanged }
            }
        };

        tx.commit().map_err(|e| MomoError::db("Commit", e))?;
        Ok(change)
    }
}

// ─── Row helpers ──────────────────────────────────────

type RawSubscription = (String, String, bool, u32, u32);
type RawJob = (String, String, String, String, String, Option<String>, String);

const JOB_COLUMNS: &str = "SELECT job_key, user_id, cron_expr, timezone, next_fire_at, last_fired_at, created_at
                           FROM scheduled_jobs";

fn insert_default(conn: &Connection, user: &UserId, defaults: NotifyTime) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT OR IGNORE INTO subscriptions
         (user_id, selectors, auto_send, notify_hour, notify_minute, created_at, updated_at)
         VALUES (?1, '[]', 0, ?2, ?3, ?4, ?4)",
        params![user.as_str(), defaults.hour(), defaults.minute(), now],
    )
    .map_err(|e| MomoError::db("Create subscription", e))?;
    Ok(())
}

fn read_subscription(conn: &Connection, user: &UserId, defaults: NotifyTime) -> Result<UserSubscription> {
    let raw = conn
        .query_row(
            "SELECT user_id, selectors, auto_send, notify_hour, notify_minute
             FROM subscriptions WHERE user_id = ?1",
            [user.as_str()],
            raw_subscription,
        )
        .map_err(|e| MomoError::db("Load subscription", e))?;
    Ok(into_subscription(raw, defaults))
}

fn write_subscription(conn: &Connection, sub: &UserSubscription) -> Result<()> {
    let tokens: Vec<String> = sub.selectors.iter().map(|s| s.token()).collect();
    let selectors = serde_json::to_string(&tokens)
        .map_err(|e| MomoError::db("Serialize selectors", e))?;
    conn.execute(
        "UPDATE subscriptions
         SET selectors = ?1, auto_send = ?2, notify_hour = ?3, notify_minute = ?4, updated_at = ?5
         WHERE user_id = ?6",
        params![
            selectors,
            sub.auto_send_enabled as i32,
            sub.notify_time.hour(),
            sub.notify_time.minute(),
            Utc::now().to_rfc3339(),
            sub.id.as_str(),
        ],
    )
    .map_err(|e| MomoError::db("Save subscription", e))?;
    Ok(())
}

fn raw_subscription(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSubscription> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get::<_, i32>(2)? != 0,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn into_subscription(
    (user_id, selectors, auto_send, hour, minute): RawSubscription,
    defaults: NotifyTime,
) -> UserSubscription {
    let tokens: Vec<String> = serde_json::from_str(&selectors).unwrap_or_else(|e| {
        tracing::warn!("⚠️ Unreadable selectors for user {user_id}: {e}");
        Vec::new()
    });
    let selectors: BTreeSet<ScopeSelector> = tokens
        .iter()
        .filter_map(|t| match t.parse() {
            Ok(sel) => Some(sel),
            Err(e) => {
                tracing::warn!("⚠️ Dropping selector for user {user_id}: {e}");
                None
            }
        })
        .collect();
    let notify_time = NotifyTime::new(hour, minute).unwrap_or_else(|e| {
        tracing::warn!("⚠️ Stored time for user {user_id} rejected: {e}");
        defaults
    });

    UserSubscription {
        id: UserId::new(user_id),
        selectors,
        auto_send_enabled: auto_send,
        notify_time,
    }
}

fn write_job(conn: &Connection, job: &ScheduledJob) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO scheduled_jobs
         (job_key, user_id, cron_expr, timezone, next_fire_at, last_fired_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            job.key.as_str(),
            job.user.as_str(),
            job.expression(),
            job.timezone,
            job.next_fire_at.to_rfc3339(),
            job.last_fired_at.map(|t| t.to_rfc3339()),
            job.created_at.to_rfc3339(),
        ],
    )
    .map_err(|e| MomoError::db("Save job", e))?;
    Ok(())
}

fn raw_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawJob> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn into_job(
    (key, user_id, trigger, timezone, next_fire_at, last_fired_at, created_at): RawJob,
) -> Option<ScheduledJob> {
    let Some(time) = cron::parse_daily(&trigger) else {
        tracing::warn!("⚠️ Job {key} has an unreadable trigger '{trigger}'");
        return None;
    };
    let Some(next_fire_at) = parse_ts(&next_fire_at) else {
        tracing::warn!("⚠️ Job {key} has an unreadable next fire time");
        return None;
    };
    Some(ScheduledJob {
        key: JobKey::from_stored(key),
        user: UserId::new(user_id),
        time,
        timezone,
        next_fire_at,
        last_fired_at: last_fired_at.as_deref().and_then(parse_ts),
        created_at: parse_ts(&created_at).unwrap_or_else(Utc::now),
    })
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}
