//! Business-day arithmetic and the daily job window.
//!
//! Timestamps are stored in UTC, but "today" for achievements, bonus pools
//! and cross-day completion checks is the calendar date in the business
//! timezone (a fixed UTC offset).

use chrono::{
    Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Timelike, Utc,
};

use crate::types::Timestamp;

/// Calendar in a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessCalendar {
    offset: FixedOffset,
}

impl BusinessCalendar {
    /// Returns `None` when the offset is outside +/-23 hours.
    pub fn with_offset_hours(hours: i32) -> Option<Self> {
        FixedOffset::east_opt(hours * 3600).map(|offset| Self { offset })
    }

    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    pub fn local(&self, at: Timestamp) -> NaiveDateTime {
        at.with_timezone(&self.offset).naive_local()
    }

    pub fn date_of(&self, at: Timestamp) -> NaiveDate {
        self.local(at).date()
    }

    /// UTC instant at which `date` begins.
    pub fn start_of(&self, date: NaiveDate) -> Timestamp {
        let local = date.and_time(NaiveTime::MIN);
        self.offset
            .from_local_datetime(&local)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&local))
    }

    /// Half-open UTC range `[start, end)` covering `date`.
    pub fn day_range(&self, date: NaiveDate) -> (Timestamp, Timestamp) {
        let start = self.start_of(date);
        (start, start + Duration::days(1))
    }

    /// True when `at` falls on a business day strictly before `now`'s.
    pub fn is_before_today(&self, at: Timestamp, now: Timestamp) -> bool {
        self.date_of(at) < self.date_of(now)
    }
}

impl Default for BusinessCalendar {
    fn default() -> Self {
        Self::utc()
    }
}

/// Hours `[start_hour, end_hour)` in which the daily job may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for DailyWindow {
    fn default() -> Self {
        Self {
            start_hour: 0,
            end_hour: 2,
        }
    }
}

impl DailyWindow {
    pub fn contains(&self, local: NaiveDateTime) -> bool {
        let hour = local.hour();
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// The daily job runs once per business date, inside the window.
pub fn should_run_daily_task(
    local_now: NaiveDateTime,
    last_run: Option<NaiveDate>,
    window: &DailyWindow,
) -> bool {
    window.contains(local_now) && last_run.map_or(true, |d| d < local_now.date())
}
