//! Daily dataset refresh loop.

use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Tz;

use momo_core::NotifyTime;
use momo_data::{DatasetSource, DatasetStore};

use crate::cron;

/// Run one refresh and feed the result to the store.
/// Returns whether a new snapshot was published.
pub async fn refresh_once(store: &DatasetStore, source: &dyn DatasetSource) -> bool {
    match source.fetch().await {
        Ok(rows) => store.on_refreshed(rows),
        Err(e) => {
            store.on_refresh_failed(&e.to_string());
            false
        }
    }
}

/// Startup load: the cached file if usable, otherwise a download.
pub async fn load_initial(store: &DatasetStore, source: &dyn DatasetSource) -> bool {
    match source.load_cached().await {
        Ok(Some(rows)) => {
            tracing::info!("📂 Loaded cached dataset ({} rows)", rows.len());
            return store.on_refreshed(rows);
        }
        Ok(None) => tracing::info!("No cached dataset, downloading"),
        Err(e) => tracing::warn!("⚠️ Cached dataset unreadable: {e}"),
    }
    refresh_once(store, source).await
}

/// Refresh every day at `at` in `tz`, forever.
pub async fn spawn_refresh_loop(
    store: Arc<DatasetStore>,
    source: Arc<dyn DatasetSource>,
    at: NotifyTime,
    tz: Tz,
) {
    tracing::info!("🔁 Dataset refresh scheduled daily at {at} ({tz})");
    loop {
        let now = Utc::now();
        let next = cron::next_daily_fire(at, tz, now);
        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        if refresh_once(&store, source.as_ref()).await {
            tracing::info!("✅ Daily dataset refresh complete");
        }
    }
}
