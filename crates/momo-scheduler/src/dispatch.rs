//! Notification Dispatcher: composes a user's report from the current
//! snapshot and hands it to the messaging collaborator.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;

use momo_core::error::{MomoError, Result};
use momo_core::messages;
use momo_core::{DeliveryOutcome, Messenger, Metric, ScopeSelector, UserId, UserSubscription};
use momo_data::{DatasetStore, query};

use crate::registry::SelectionRegistry;

/// Result of composing a report for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    /// No snapshot has ever been loaded.
    Unavailable,
    /// No selector produced a metric (including "no selectors").
    NoData,
    /// One rendered entry per selector that resolved, in selector order.
    Entries(Vec<String>),
}

impl Report {
    pub fn render(&self) -> String {
        match self {
            Report::Unavailable => messages::DATA_UNAVAILABLE.to_string(),
            Report::NoData => messages::NO_DATA.to_string(),
            Report::Entries(entries) => entries.join("\n\n"),
        }
    }

    /// `DataUnavailable` when no snapshot has been loaded yet.
    pub fn into_result(self) -> Result<Report> {
        match self {
            Report::Unavailable => Err(MomoError::DataUnavailable),
            report => Ok(report),
        }
    }
}

/// What happened to a scheduled fire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    Delivered,
    /// Recipient unreachable for good; auto-send switched off.
    Unsubscribed,
    /// Delivery failed for now; the job stays for the next occurrence.
    Deferred,
    /// Auto-send was already off; nothing sent and the leftover job removed.
    Inactive,
}

pub struct Dispatcher {
    registry: Arc<SelectionRegistry>,
    store: Arc<DatasetStore>,
    messenger: Arc<dyn Messenger>,
    tz: Tz,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<SelectionRegistry>,
        store: Arc<DatasetStore>,
        messenger: Arc<dyn Messenger>,
        tz: Tz,
    ) -> Self {
        Self {
            registry,
            store,
            messenger,
            tz,
        }
    }

    /// Today in the configured zone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.tz).date_naive()
    }

    /// Resolve every selector against one snapshot. The snapshot is loaded
    /// once, so a concurrent refresh cannot mix two datasets in one report.
    pub fn compose(&self, sub: &UserSubscription, as_of: NaiveDate) -> Report {
        let Some(snapshot) = self.store.current_snapshot() else {
            return Report::Unavailable;
        };

        let entries: Vec<String> = sub
            .selectors
            .iter()
            .filter_map(|sel| query::resolve(&snapshot, sel, as_of).map(|m| format_entry(sel, &m)))
            .collect();

        if entries.is_empty() {
            Report::NoData
        } else {
            Report::Entries(entries)
        }
    }

    /// On-demand report for `user`, outside the daily schedule.
    pub fn compute_now(&self, user: &UserId) -> Result<String> {
        self.compute_at(user, self.today())
    }

    /// Report for `user` as of a given date.
    pub fn compute_at(&self, user: &UserId, as_of: NaiveDate) -> Result<String> {
        Ok(self.report_at(user, as_of)?.render())
    }

    pub fn report_at(&self, user: &UserId, as_of: NaiveDate) -> Result<Report> {
        let sub = self.registry.get(user)?;
        Ok(self.compose(&sub, as_of))
    }

    /// Scheduled delivery for `user`.
    pub async fn fire(&self, user: &UserId) -> Result<FireOutcome> {
        self.fire_at(user, self.today()).await
    }

    pub async fn fire_at(&self, user: &UserId, as_of: NaiveDate) -> Result<FireOutcome> {
        let sub = self.registry.get(user)?;
        if !sub.auto_send_enabled {
            tracing::warn!("⚠️ Job fired for user {user} with auto-send off, removing it");
            self.registry.disable_auto_send(user)?;
            return Ok(FireOutcome::Inactive);
        }
        let report = self.compose(&sub, as_of);
        if report == Report::Unavailable {
            tracing::warn!("⚠️ No dataset loaded, sending placeholder to user {user}");
        }
        let text = format!("{}\n\n{}", messages::DAILY_HEADER, report.render());

        match self.messenger.send(user, &text).await {
            DeliveryOutcome::Delivered => {
                tracing::info!("✅ Daily update delivered to user {user} via {}", self.messenger.name());
                Ok(FireOutcome::Delivered)
            }
            DeliveryOutcome::PermanentFailure(reason) => {
                tracing::warn!("🚫 User {user} unreachable ({reason}), disabling auto-send");
                self.registry.disable_auto_send(user)?;
                Ok(FireOutcome::Unsubscribed)
            }
            DeliveryOutcome::TransientFailure(reason) => {
                tracing::warn!("⚠️ Delivery to user {user} failed ({reason}), will retry next occurrence");
                Ok(FireOutcome::Deferred)
            }
        }
    }
}

/// One report entry in Telegram Markdown.
pub fn format_entry(selector: &ScopeSelector, metric: &Metric) -> String {
    format!(
        "📊 *{}* ({})\n  - Observadas: *{}*\n  - Esperadas: *{}*\n  - Exceso: *{}*",
        selector.display_name(),
        metric.date.format("%d/%m/%Y"),
        metric.observed,
        metric.expected,
        metric.signed_excess()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_entry() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 4).unwrap();
        let text = format_entry(
            &ScopeSelector::Province("Sevilla".into()),
            &Metric::new(date, 40, 52),
        );
        assert_eq!(
            text,
            "📊 *Sevilla* (04/03/2026)\n  - Observadas: *40*\n  - Esperadas: *52*\n  - Exceso: *-12*"
        );
    }

    #[test]
    fn test_national_display_name() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let text = format_entry(&ScopeSelector::National, &Metric::new(date, 10, 10));
        assert!(text.starts_with("📊 *Nacional*"));
        assert!(text.ends_with("*+0*"));
    }

    #[test]
    fn test_render() {
        assert_eq!(Report::NoData.render(), messages::NO_DATA);
        assert_eq!(Report::Unavailable.render(), messages::DATA_UNAVAILABLE);
        assert_eq!(Report::Entries(vec!["a".into(), "b".into()]).render(), "a\n\nb");
    }

    #[test]
    fn test_unavailable_into_result() {
        assert!(matches!(Report::Unavailable.into_result(), Err(MomoError::DataUnavailable)));
        assert_eq!(Report::NoData.into_result().unwrap(), Report::NoData);
    }
}
