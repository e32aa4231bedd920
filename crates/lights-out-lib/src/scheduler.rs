//! Work-window evaluation
//!
//! A pure evaluator answering "is this instant inside working hours" for a
//! configured IANA time zone. It never reads the wall clock; callers pass the
//! instant in.

use crate::error::SchedulerError;
use crate::models::DiscoveredResource;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Monday through Friday
pub const DEFAULT_WORK_DAYS: [u8; 5] = [0, 1, 2, 3, 4];

/// An instant to evaluate, with or without zone information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleInstant {
    /// Already expressed in the scheduler's zone
    Naive(NaiveDateTime),
    /// Converted to the scheduler's zone before comparison
    Zoned(DateTime<FixedOffset>),
}

impl From<NaiveDateTime> for ScheduleInstant {
    fn from(dt: NaiveDateTime) -> Self {
        ScheduleInstant::Naive(dt)
    }
}

impl From<DateTime<FixedOffset>> for ScheduleInstant {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        ScheduleInstant::Zoned(dt)
    }
}

impl From<DateTime<Utc>> for ScheduleInstant {
    fn from(dt: DateTime<Utc>) -> Self {
        ScheduleInstant::Zoned(dt.fixed_offset())
    }
}

impl From<DateTime<Tz>> for ScheduleInstant {
    fn from(dt: DateTime<Tz>) -> Self {
        ScheduleInstant::Zoned(dt.fixed_offset())
    }
}

/// Evaluates instants against configured work days and hours
#[derive(Debug, Clone, PartialEq)]
pub struct WorkScheduler {
    timezone: Tz,
    /// Indexed by weekday ordinal, 0 = Monday
    work_days: [bool; 7],
    work_start: NaiveTime,
    work_end: NaiveTime,
}

impl WorkScheduler {
    /// Create a scheduler, failing on an unknown zone, an out-of-range day or
    /// a start that is not strictly before the end
    pub fn new(
        timezone: &str,
        work_days: &[u8],
        work_start: NaiveTime,
        work_end: NaiveTime,
    ) -> Result<Self, SchedulerError> {
        let tz: Tz = timezone
            .parse()
            .map_err(|_| SchedulerError::UnknownTimezone(timezone.to_string()))?;

        let mut days = [false; 7];
        for &day in work_days {
            let slot = days
                .get_mut(usize::from(day))
                .ok_or(SchedulerError::InvalidWorkDay(day))?;
            *slot = true;
        }

        if work_start >= work_end {
            return Err(SchedulerError::InvalidWorkHours {
                start: work_start.format("%H:%M:%S").to_string(),
                end: work_end.format("%H:%M:%S").to_string(),
            });
        }

        Ok(Self {
            timezone: tz,
            work_days: days,
            work_start,
            work_end,
        })
    }

    /// Monday to Friday, 09:00 to 17:00 in the given zone
    pub fn with_defaults(timezone: &str) -> Result<Self, SchedulerError> {
        Self::new(
            timezone,
            &DEFAULT_WORK_DAYS,
            hm(9, 0),
            hm(17, 0),
        )
    }

    /// Create a scheduler from "HH:MM" (or "HH:MM:SS") strings
    pub fn from_strings(
        timezone: &str,
        work_days: &[u8],
        work_start: &str,
        work_end: &str,
    ) -> Result<Self, SchedulerError> {
        Self::new(
            timezone,
            work_days,
            parse_time_of_day(work_start)?,
            parse_time_of_day(work_end)?,
        )
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// True when the zone-local weekday is a configured work day
    pub fn is_workday(&self, at: impl Into<ScheduleInstant>) -> bool {
        let local = self.localize(at.into());
        self.workday_matches(&local)
    }

    /// True when `start <= local time < end`
    pub fn is_working_hours(&self, at: impl Into<ScheduleInstant>) -> bool {
        let local = self.localize(at.into());
        self.hours_match(&local)
    }

    /// Work day and working hours, evaluated against one zone conversion
    pub fn is_during_work_time(&self, at: impl Into<ScheduleInstant>) -> bool {
        let local = self.localize(at.into());
        self.workday_matches(&local) && self.hours_match(&local)
    }

    fn localize(&self, at: ScheduleInstant) -> NaiveDateTime {
        match at {
            ScheduleInstant::Naive(dt) => dt,
            ScheduleInstant::Zoned(dt) => self
                .timezone
                .from_utc_datetime(&dt.naive_utc())
                .naive_local(),
        }
    }

    fn workday_matches(&self, local: &NaiveDateTime) -> bool {
        let ordinal = local.weekday().num_days_from_monday() as usize;
        self.work_days[ordinal]
    }

    fn hours_match(&self, local: &NaiveDateTime) -> bool {
        let t = local.time();
        self.work_start <= t && t < self.work_end
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

fn parse_time_of_day(value: &str) -> Result<NaiveTime, SchedulerError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| SchedulerError::InvalidTimeOfDay(value.to_string()))
}

/// Schedule identifier carried by a resource, if any
///
/// An empty tag value counts as no schedule.
pub fn schedule_for<'a>(resource: &'a DiscoveredResource, schedule_tag: &str) -> Option<&'a str> {
    resource
        .tag(schedule_tag)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
