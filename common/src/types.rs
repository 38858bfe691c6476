use std::fmt;
use std::ops::Add;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// An absolute calendar moment as stored by a battery-backed RTC.
///
/// The invalid value models a failed or out-of-range hardware read. It
/// compares before every valid timestamp and stays invalid through
/// arithmetic, so callers only have to check validity at the edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    inner: Option<NaiveDateTime>,
}

impl Timestamp {
    pub const INVALID: Timestamp = Timestamp { inner: None };

    /// Builds a timestamp from calendar fields; out-of-range fields yield
    /// the invalid value.
    pub fn from_ymd_hms(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Self {
        let inner = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_opt(hour, minute, second));
        Self { inner }
    }

    /// Builds a timestamp from UTC-naive epoch seconds.
    pub fn from_unix(epoch: i64) -> Self {
        Self {
            inner: chrono::DateTime::from_timestamp(epoch, 0).map(|dt| dt.naive_utc()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.inner.is_some()
    }

    pub fn year(&self) -> i32 {
        self.inner.map_or(0, |dt| dt.year())
    }

    pub fn month(&self) -> u32 {
        self.inner.map_or(0, |dt| dt.month())
    }

    pub fn day(&self) -> u32 {
        self.inner.map_or(0, |dt| dt.day())
    }

    pub fn hour(&self) -> u32 {
        self.inner.map_or(0, |dt| dt.hour())
    }

    pub fn minute(&self) -> u32 {
        self.inner.map_or(0, |dt| dt.minute())
    }

    pub fn second(&self) -> u32 {
        self.inner.map_or(0, |dt| dt.second())
    }

    /// Day of week, 0 = Sunday through 6 = Saturday.
    pub fn day_of_week(&self) -> u8 {
        self.inner
            .map_or(0, |dt| dt.weekday().num_days_from_sunday() as u8)
    }

    /// UTC-naive epoch seconds; 0 for the invalid value.
    pub fn unix_time(&self) -> i64 {
        self.inner.map_or(0, |dt| dt.and_utc().timestamp())
    }

    /// Minutes elapsed since midnight.
    pub fn minutes_of_day(&self) -> u16 {
        (self.hour() * 60 + self.minute()) as u16
    }

    /// Same calendar date at the given time of day.
    pub fn at_time(&self, hour: u32, minute: u32, second: u32) -> Timestamp {
        Self {
            inner: self
                .inner
                .and_then(|dt| dt.date().and_hms_opt(hour, minute, second)),
        }
    }

    /// Addition that saturates to the invalid value on overflow.
    pub fn checked_add(&self, delta: Duration) -> Timestamp {
        Self {
            inner: self.inner.and_then(|dt| dt.checked_add_signed(delta)),
        }
    }

    pub fn as_naive(&self) -> Option<NaiveDateTime> {
        self.inner
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, delta: Duration) -> Timestamp {
        self.checked_add(delta)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            None => write!(f, "<invalid>"),
        }
    }
}

/// Bit-per-weekday enablement set; bit 0 = Sunday through bit 6 = Saturday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayMask(pub u8);

impl DayMask {
    pub const NONE: DayMask = DayMask(0);
    pub const ALL: DayMask = DayMask(0b0111_1111);
    pub const WEEKDAYS: DayMask = DayMask(0b0011_1110);
    pub const WEEKEND: DayMask = DayMask(0b0100_0001);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 & 0x7f == 0
    }

    pub fn contains(self, day_of_week: u8) -> bool {
        day_of_week < 7 && self.0 & (1 << day_of_week) != 0
    }

    pub fn with_day(self, day_of_week: u8, enable: bool) -> DayMask {
        if day_of_week >= 7 {
            return self;
        }
        if enable {
            DayMask(self.0 | 1 << day_of_week)
        } else {
            DayMask(self.0 & !(1 << day_of_week))
        }
    }
}

impl fmt::Display for DayMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const COMPACT: [&str; 7] = ["Su", "Mo", "Tu", "We", "Th", "Fr", "Sa"];

        let mut any = false;
        for (day, label) in COMPACT.iter().enumerate() {
            if self.contains(day as u8) {
                if any {
                    write!(f, ",")?;
                }
                write!(f, "{label}")?;
                any = true;
            }
        }
        if !any {
            write!(f, "None")?;
        }
        Ok(())
    }
}

const SHORT_DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const LONG_DAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// Sentinel returned by [`day_of_week_from_str`] for unrecognized input.
pub const DAY_OF_WEEK_INVALID: u8 = 255;

pub fn day_of_week_str(day_of_week: u8) -> &'static str {
    SHORT_DAY_NAMES
        .get(day_of_week as usize)
        .copied()
        .unwrap_or("???")
}

/// Accepts 3-letter and full day names, case-insensitive.
pub fn day_of_week_from_str(name: &str) -> u8 {
    for day in 0..7u8 {
        if name.eq_ignore_ascii_case(SHORT_DAY_NAMES[day as usize])
            || name.eq_ignore_ascii_case(LONG_DAY_NAMES[day as usize])
        {
            return day;
        }
    }
    DAY_OF_WEEK_INVALID
}

/// Die-temperature reading taken from the clock peripheral.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureReading {
    pub celsius: f32,
    pub fahrenheit: f32,
    pub timestamp: Timestamp,
}

/// Snapshot of engine state for status publishing.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub initialized: bool,
    pub time: String,
    pub date: String,
    #[serde(rename = "scheduleCount")]
    pub schedule_count: usize,
    #[serde(rename = "heatActive")]
    pub heat_active: bool,
    #[serde(rename = "activeScheduleId")]
    pub active_schedule_id: Option<u8>,
    #[serde(rename = "activeScheduleName")]
    pub active_schedule_name: Option<String>,
    #[serde(rename = "nextStartEpoch")]
    pub next_start_epoch: Option<i64>,
    #[serde(rename = "secondsUntilNextEvent")]
    pub seconds_until_next_event: u32,
    #[serde(rename = "vacationActive")]
    pub vacation_active: bool,
    #[serde(rename = "maintenanceDue")]
    pub maintenance_due: bool,
    #[serde(rename = "temperatureC")]
    pub temperature_c: Option<f32>,
    #[serde(rename = "statusLine")]
    pub status_line: String,
}
