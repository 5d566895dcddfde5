/// Time-window selection over the archive tables.
///
/// Periods anchor at civil midnight (see `timefmt`) minus a fixed day offset;
/// `year` is a 365-day approximation rather than calendar-year boundaries.
/// Filtering always copies the matching rows, never mutates the source table.
use chrono::{DateTime, Duration, Utc};

use crate::model::Timestamped;
use crate::timefmt::civil_midnight;

/// Upper bound for last-N-hours periods: the hours in 20 years. Also the
/// sentinel for "never expires" counts elsewhere.
pub const MAX_HOURS: u32 = 24 * 365 * 20;

/// Requested time-window mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Today,
    Yesterday,
    LastHours(u32),
    Week,
    Month,
    Year,
    Total,
}

impl Period {
    /// Parse a period token: a fixed mode word, or a positive hour count.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "today" => Some(Self::Today),
            "yesterday" => Some(Self::Yesterday),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            "year" => Some(Self::Year),
            "total" => Some(Self::Total),
            other => match other.parse::<u32>() {
                Ok(hours) if (1..=MAX_HOURS).contains(&hours) => Some(Self::LastHours(hours)),
                _ => None,
            },
        }
    }

    /// Label used in reply headlines.
    pub fn label(&self) -> String {
        match self {
            Self::Today => "today".to_string(),
            Self::Yesterday => "yesterday".to_string(),
            Self::LastHours(hours) => format!("past {}h", hours),
            Self::Week => "week".to_string(),
            Self::Month => "month".to_string(),
            Self::Year => "year".to_string(),
            Self::Total => "total".to_string(),
        }
    }

    /// Day offset back from civil midnight for the fixed modes.
    fn day_offset(&self) -> Option<i64> {
        match self {
            Self::Today => Some(0),
            Self::Yesterday => Some(1),
            Self::Week => Some(7),
            Self::Month => Some(30),
            Self::Year => Some(365),
            Self::LastHours(_) | Self::Total => None,
        }
    }
}

/// Half-open `[start, end)` selection bounds; `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowBounds {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl WindowBounds {
    fn contains(&self, at: DateTime<Utc>) -> bool {
        if let Some(start) = self.start {
            if at < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if at >= end {
                return false;
            }
        }
        true
    }
}

/// Bounds of the requested window, relative to `now`.
pub fn window_bounds(period: Period, now: DateTime<Utc>) -> WindowBounds {
    match period {
        Period::Total => WindowBounds {
            start: None,
            end: None,
        },
        Period::LastHours(hours) => WindowBounds {
            start: Some(now - Duration::hours(hours as i64)),
            end: None,
        },
        Period::Yesterday => {
            let midnight = civil_midnight(now);
            WindowBounds {
                start: Some(midnight - Duration::days(1)),
                end: Some(midnight),
            }
        }
        fixed => {
            let offset = fixed.day_offset().expect("fixed mode has a day offset");
            WindowBounds {
                start: Some(civil_midnight(now) - Duration::days(offset)),
                end: None,
            }
        }
    }
}

/// Bounds of the equal-length window immediately preceding the requested one.
///
/// Used for period-over-period deltas; `total` has no predecessor and yields
/// an empty selection.
pub fn shifted_window_bounds(period: Period, now: DateTime<Utc>) -> WindowBounds {
    match period {
        Period::Total => WindowBounds {
            start: Some(now),
            end: Some(now),
        },
        Period::LastHours(hours) => {
            let span = Duration::hours(hours as i64);
            WindowBounds {
                start: Some(now - span - span),
                end: Some(now - span),
            }
        }
        Period::Yesterday => {
            let midnight = civil_midnight(now);
            WindowBounds {
                start: Some(midnight - Duration::days(2)),
                end: Some(midnight - Duration::days(1)),
            }
        }
        Period::Today => {
            let midnight = civil_midnight(now);
            WindowBounds {
                start: Some(midnight - Duration::days(1)),
                end: Some(midnight),
            }
        }
        fixed => {
            let offset = fixed.day_offset().expect("fixed mode has a day offset");
            let end = civil_midnight(now) - Duration::days(offset);
            WindowBounds {
                start: Some(end - Duration::days(offset)),
                end: Some(end),
            }
        }
    }
}

fn select<T: Timestamped + Clone>(rows: &[T], bounds: WindowBounds) -> Vec<T> {
    rows.iter()
        .filter(|row| bounds.contains(row.timestamp()))
        .cloned()
        .collect()
}

/// Rows of `rows` inside the requested window, as an independent copy.
pub fn filter_window<T: Timestamped + Clone>(
    rows: &[T],
    period: Period,
    now: DateTime<Utc>,
) -> Vec<T> {
    select(rows, window_bounds(period, now))
}

/// Rows of `rows` inside the shifted (previous, equal-length) window.
pub fn filter_shifted_window<T: Timestamped + Clone>(
    rows: &[T],
    period: Period,
    now: DateTime<Utc>,
) -> Vec<T> {
    select(rows, shifted_window_bounds(period, now))
}
