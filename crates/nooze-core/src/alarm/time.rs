//! Wall-clock wake times and next-occurrence computation.
//!
//! Everything here is pure: callers pass `now` in, so the recurrence rule
//! can be tested at any instant and in any time zone.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A validated local wall-clock time (`hour:minute:00.000`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WakeTime {
    hour: u32,
    minute: u32,
}

impl WakeTime {
    /// # Errors
    /// Returns a [`ValidationError`] when hour or minute is out of range.
    pub fn new(hour: u32, minute: u32) -> Result<Self, ValidationError> {
        if hour > 23 {
            return Err(ValidationError::InvalidHour(hour));
        }
        if minute > 59 {
            return Err(ValidationError::InvalidMinute(minute));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    fn naive_time(&self) -> NaiveTime {
        // Range checked in `new`.
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN)
    }

    /// The instant this wake time falls on for a given local date.
    ///
    /// Ambiguous local times (clocks falling back) resolve to the earlier
    /// instant. Local times skipped by a forward transition resolve to the
    /// first valid instant after the gap.
    pub fn on_date<Tz: TimeZone>(&self, tz: &Tz, date: NaiveDate) -> DateTime<Tz> {
        let naive = date.and_time(self.naive_time());
        match tz.from_local_datetime(&naive) {
            LocalResult::Single(t) => t,
            LocalResult::Ambiguous(earliest, _) => earliest,
            LocalResult::None => {
                // Walk forward minute by minute out of the gap; real gaps are
                // at most a couple of hours.
                let mut probe = naive;
                for _ in 0..(3 * 60) {
                    probe += Duration::minutes(1);
                    if let Some(t) = tz.from_local_datetime(&probe).earliest() {
                        return t;
                    }
                }
                tz.from_utc_datetime(&naive)
            }
        }
    }
}

impl fmt::Display for WakeTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for WakeTime {
    type Err = ValidationError;

    /// Parses `H:MM` / `HH:MM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ValidationError::InvalidTimeFormat(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(bad)?;
        if h.is_empty() || m.len() != 2 {
            return Err(bad());
        }
        let hour = h.parse::<u32>().map_err(|_| bad())?;
        let minute = m.parse::<u32>().map_err(|_| bad())?;
        WakeTime::new(hour, minute)
    }
}

/// Next instant strictly after `now` at `wake` local wall-clock time.
///
/// Today's occurrence is used when it is still in the future; otherwise
/// the occurrence on the following day. A `now` exactly on the wake time
/// rolls forward.
pub fn next_occurrence<Tz: TimeZone>(wake: WakeTime, now: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    let today = now.date_naive();
    let candidate = wake.on_date(&tz, today);
    if candidate > *now {
        return candidate;
    }
    match today.succ_opt() {
        Some(tomorrow) => wake.on_date(&tz, tomorrow),
        None => candidate + Duration::days(1),
    }
}

/// `YYYY-MM-DD` key for the local date of `at`.
pub fn date_key<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    at.format("%Y-%m-%d").to_string()
}
