//! Query Engine: nearest-date lookup for one selector.
//!
//! Pure function of (snapshot, selector, as_of).

use chrono::NaiveDate;

use momo_core::{DatasetRecord, Metric, ScopeSelector};

use crate::store::Snapshot;

const ALL: &str = "all";

/// Find the row closest to `as_of` for `selector` and derive its excess.
///
/// Only rows for both sexes and all age groups with an observed count are
/// eligible. Ties on distance go to the earlier date. `None` means the
/// selector matched nothing usable.
pub fn resolve(snapshot: &Snapshot, selector: &ScopeSelector, as_of: NaiveDate) -> Option<Metric> {
    snapshot
        .rows()
        .iter()
        .filter(|r| matches_selector(r, selector))
        .filter(|r| r.sex_code == ALL && r.age_group_code == ALL)
        .filter_map(|r| r.observed.map(|obs| (r, obs)))
        .min_by_key(|(r, _)| ((r.date - as_of).num_days().abs(), r.date))
        .map(|(r, observed)| Metric::new(r.date, observed, r.expected))
}

fn matches_selector(row: &DatasetRecord, selector: &ScopeSelector) -> bool {
    if row.level != selector.level() {
        return false;
    }
    match selector.area_name() {
        Some(name) => row.scope_name == name,
        None => true,
    }
}
