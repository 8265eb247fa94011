//! Calendar windows for the leaderboard periods.
//!
//! Boundaries are derived from the wall clock at the moment a job runs and are never stored on
//! their own; rows only remember the `window_start` they were computed for.

use chrono::{
    DateTime, Datelike, Days, FixedOffset, Months, NaiveDate, NaiveTime, Offset, TimeDelta,
    TimeZone, Utc,
};

use crate::db::models::leaderboard::Period;

/// Half-open time range `[start, end)`. `end = None` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub period: Period,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl Window {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && self.end.is_none_or(|end| at < end)
    }
}

/// Places period boundaries in the display timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    offset: FixedOffset,
}

impl Default for Calendar {
    fn default() -> Self {
        Self { offset: Utc.fix() }
    }
}

impl Calendar {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// The window of `period` that contains `now`: weeks start Monday 00:00 local, months start
    /// on day 1 at 00:00 local.
    pub fn window(&self, period: Period, now: DateTime<Utc>) -> Window {
        let local_date = now.with_timezone(&self.offset).date_naive();
        let start_date = period_start(period, local_date);

        Window {
            period,
            start: self.local_midnight(start_date),
            end: following_start(period, start_date).map(|date| self.local_midnight(date)),
        }
    }

    /// First boundary of `period` strictly after `after`.
    pub fn next_boundary(&self, period: Period, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.window(period, after).end
    }

    fn local_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        let local = date.and_time(NaiveTime::MIN);
        let offset = TimeDelta::seconds(self.offset.local_minus_utc() as i64);
        Utc.from_utc_datetime(&(local - offset))
    }
}

fn period_start(period: Period, date: NaiveDate) -> NaiveDate {
    let back = match period {
        Period::Weekly => date.weekday().num_days_from_monday(),
        Period::Monthly => date.day0(),
    };

    date - Days::new(back as u64)
}

fn following_start(period: Period, start: NaiveDate) -> Option<NaiveDate> {
    match period {
        Period::Weekly => start.checked_add_days(Days::new(7)),
        Period::Monthly => start.checked_add_months(Months::new(1)),
    }
}
