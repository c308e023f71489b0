//! # MoMo Scheduler
//!
//! Durable per-user state and the daily delivery pipeline.
//!
//! ```text
//! SelectionRegistry ──sync──► JobScheduler (scheduled_jobs)
//!        │                          │ tick: claim_due
//!   subscriptions                   ▼
//!        └──────────────────► Dispatcher ──► Messenger
//!                                   ▲
//!                  DatasetStore ────┘  (refreshed daily by refresh loop)
//! ```

pub mod cron;
pub mod dispatch;
pub mod engine;
pub mod jobs;
pub mod persistence;
pub mod refresh;
pub mod registry;

pub use dispatch::{Dispatcher, FireOutcome, Report};
pub use engine::{JobScheduler, ReconcileReport, spawn_scheduler};
pub use jobs::{JobKey, ScheduledJob};
pub use persistence::{JobChange, SchedulerDb};
pub use registry::{Acceptance, ScheduleHook, SelectionRegistry};
