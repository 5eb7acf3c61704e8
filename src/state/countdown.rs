use chrono::{DateTime, NaiveDateTime, Utc};
use std::time::Duration;

const MS_PER_HOUR: i64 = 3_600_000;
const MS_PER_MINUTE: i64 = 60_000;
const MS_PER_SECOND: i64 = 1_000;

/// Under this much time left a hold is shown as critical.
const CRITICAL_MS: i64 = MS_PER_MINUTE;
/// Under this much time left a hold is shown as a warning.
const WARNING_MS: i64 = 5 * MS_PER_MINUTE;

/// Derived countdown for one held item. Recomputed every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownState {
    /// Milliseconds until the hold lapses. Exactly 0 once expired.
    pub total_millis: i64,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    /// Share of the hold window already elapsed, 0-100
    pub percentage: u8,
    pub expired: bool,
}

/// Display band for a countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Urgency {
    Normal,
    Warning,
    Critical,
    Expired,
}

impl CountdownState {
    /// The terminal state. Also the answer for any window we cannot read.
    pub fn expired() -> Self {
        Self {
            total_millis: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
            percentage: 100,
            expired: true,
        }
    }

    /// "H:MM:SS" with hours, "MM:SS" without.
    pub fn clock(&self) -> String {
        if self.hours > 0 {
            format!("{}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
        } else {
            format!("{:02}:{:02}", self.minutes, self.seconds)
        }
    }

    /// What the cart shows next to the item.
    pub fn label(&self) -> String {
        if self.expired {
            "Expired".to_string()
        } else {
            self.clock()
        }
    }

    pub fn urgency(&self) -> Urgency {
        if self.expired {
            Urgency::Expired
        } else if self.total_millis < CRITICAL_MS {
            Urgency::Critical
        } else if self.total_millis < WARNING_MS {
            Urgency::Warning
        } else {
            Urgency::Normal
        }
    }
}

/// Parse a backend timestamp. Accepts RFC 3339 and offset-less
/// `YYYY-MM-DD[T ]HH:MM:SS[.frac]`, the latter read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Countdown for a hold window at `now`.
///
/// Never fails: an unreadable window yields [`CountdownState::expired`], so a
/// bad timestamp leads to removal rather than a countdown that never ends.
pub fn compute_remaining(
    added_at: &str,
    expires_at: &str,
    now: DateTime<Utc>,
    fallback_window: Duration,
) -> CountdownState {
    match (parse_timestamp(added_at), parse_timestamp(expires_at)) {
        (Some(added), Some(expires)) => remaining_between(added, expires, now, fallback_window),
        _ => CountdownState::expired(),
    }
}

/// Same as [`compute_remaining`] for already-parsed timestamps.
pub fn remaining_between(
    added: DateTime<Utc>,
    expires: DateTime<Utc>,
    now: DateTime<Utc>,
    fallback_window: Duration,
) -> CountdownState {
    if now >= expires {
        return CountdownState::expired();
    }

    let total = expires.signed_duration_since(now).num_milliseconds();
    if total <= 0 {
        return CountdownState::expired();
    }
    let window = expires.signed_duration_since(added).num_milliseconds();

    let ratio = if window > 0 {
        (window - total) as f64 / window as f64
    } else {
        // Degenerate window: measure against the nominal hold length instead
        let fallback = i64::try_from(fallback_window.as_millis()).unwrap_or(i64::MAX);
        if fallback <= 0 {
            1.0
        } else {
            total as f64 / fallback as f64
        }
    };

    CountdownState {
        total_millis: total,
        hours: u32::try_from(total / MS_PER_HOUR).unwrap_or(u32::MAX),
        minutes: ((total % MS_PER_HOUR) / MS_PER_MINUTE) as u32,
        seconds: ((total % MS_PER_MINUTE) / MS_PER_SECOND) as u32,
        percentage: (ratio * 100.0).clamp(0.0, 100.0).round() as u8,
        expired: false,
    }
}
