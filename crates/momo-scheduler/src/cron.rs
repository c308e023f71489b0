//! Daily cron triggers.
//! Supports the daily subset of "MIN HOUR DOM MON DOW": a single minute and
//! hour, with `*` for the three date fields. Example: "30 8 * * *".
//!
//! Fire times are computed in the configured zone, so a trigger at 12:00
//! stays at 12:00 local time across DST changes.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use momo_core::NotifyTime;

/// Cron expression for a daily trigger.
pub fn daily_expression(time: NotifyTime) -> String {
    format!("{} {} * * *", time.minute(), time.hour())
}

/// Parse a daily cron expression back into its time of day.
pub fn parse_daily(expression: &str) -> Option<NotifyTime> {
    let parts: Vec<&str> = expression.split_whitespace().collect();
    if parts.len() != 5 {
        tracing::warn!(
            "Invalid cron expression: '{}' (need 5 fields: MIN HOUR DOM MON DOW)",
            expression
        );
        return None;
    }
    if parts[2..].iter().any(|f| *f != "*") {
        tracing::warn!("Only daily cron expressions are supported: '{}'", expression);
        return None;
    }

    let minute = parse_field(parts[0], 0, 59)?;
    let hour = parse_field(parts[1], 0, 23)?;
    NotifyTime::new(hour, minute).ok()
}

/// Single numeric value within bounds.
fn parse_field(field: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = field.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Next instant strictly after `after` at which `time` occurs in `tz`.
pub fn next_daily_fire(time: NotifyTime, tz: Tz, after: DateTime<Utc>) -> DateTime<Utc> {
    let local_day = after.with_timezone(&tz).date_naive();

    for offset in 0..3 {
        let Some(naive) = (local_day + Duration::days(offset))
            .and_hms_opt(time.hour(), time.minute(), 0)
        else {
            continue;
        };
        if let Some(at) = resolve_local(tz, naive)
            && at > after
        {
            return at;
        }
    }

    // Unreachable for real zones: three consecutive days cannot all be gaps.
    after + Duration::days(1)
}

/// Map a wall-clock time to UTC. Ambiguous times (DST end) take the first
/// occurrence; times inside a DST gap move forward by one hour.
fn resolve_local(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|t| t.with_timezone(&Utc))
}
