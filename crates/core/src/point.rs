// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cycle points: positions on a workflow's time axis.
//!
//! A point is either an arbitrary signed integer or a calendar date-time.
//! The two flavours never compare to each other; mixing them is an error,
//! not a panic. Date-time arithmetic is calendar-aware: nominal month and
//! year steps clamp the day-of-month, and canonicalization of overflowing
//! time components is deferred until comparison.

use crate::duration::{Duration, IsoDuration};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Errors from cycle point and duration handling
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PointError {
    #[error("bad cycle point: {0}")]
    BadCyclePoint(String),
    #[error("bad duration: {0}")]
    BadDuration(String),
    #[error("cannot mix integer and date-time cycling: {0}")]
    FlavourMismatch(String),
}

/// Calendar used for date-time cycling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Calendar {
    /// Proleptic Gregorian calendar
    #[default]
    Gregorian,
    /// Twelve 30-day months
    #[serde(rename = "360day")]
    Day360,
    /// Gregorian month lengths, no leap years
    #[serde(rename = "365day")]
    Day365,
}

impl Calendar {
    /// Days in the given month (1-12) of the given year.
    pub fn days_in_month(&self, year: i64, month: u32) -> u32 {
        const LENGTHS: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
        match self {
            Calendar::Day360 => 30,
            Calendar::Day365 => LENGTHS[((month - 1) % 12) as usize],
            Calendar::Gregorian => {
                if month == 2 && is_leap_year(year) {
                    29
                } else {
                    LENGTHS[((month - 1) % 12) as usize]
                }
            }
        }
    }
}

fn is_leap_year(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Days since 1970-01-01 in the proleptic Gregorian calendar.
///
/// Howard Hinnant's `days_from_civil` algorithm: pure integer arithmetic,
/// valid over the full i64 year range used here.
fn gregorian_days(year: i64, month: i64, day: i64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Inverse of [`gregorian_days`].
fn gregorian_civil(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    (if m <= 2 { y + 1 } else { y }, m as u32, d as u32)
}

/// Cumulative day-of-year offsets for the 365-day calendar.
const DAY365_CUMULATIVE: [i64; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

/// A calendar date-time with second precision.
///
/// Components are kept as parsed or computed; ordering canonicalizes via a
/// seconds-since-epoch key so non-canonical intermediates compare correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateTimePoint {
    pub calendar: Calendar,
    pub year: i64,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl DateTimePoint {
    /// Seconds since the calendar's 1970-01-01T00:00:00 epoch.
    pub fn epoch_seconds(&self) -> i64 {
        let days = match self.calendar {
            Calendar::Gregorian => {
                gregorian_days(self.year, i64::from(self.month), i64::from(self.day))
            }
            Calendar::Day360 => {
                (self.year - 1970) * 360
                    + i64::from(self.month - 1) * 30
                    + i64::from(self.day)
                    - 1
            }
            Calendar::Day365 => {
                (self.year - 1970) * 365
                    + DAY365_CUMULATIVE[((self.month - 1) % 12) as usize]
                    + i64::from(self.day)
                    - 1
            }
        };
        days * 86_400
            + i64::from(self.hour) * 3_600
            + i64::from(self.minute) * 60
            + i64::from(self.second)
    }

    /// Rebuild a point from seconds since the calendar's epoch.
    pub fn from_epoch_seconds(calendar: Calendar, seconds: i64) -> Self {
        let days = seconds.div_euclid(86_400);
        let tod = seconds.rem_euclid(86_400);
        let (year, month, day) = match calendar {
            Calendar::Gregorian => gregorian_civil(days),
            Calendar::Day360 => {
                let year = 1970 + days.div_euclid(360);
                let doy = days.rem_euclid(360);
                (year, (doy / 30) as u32 + 1, (doy % 30) as u32 + 1)
            }
            Calendar::Day365 => {
                let year = 1970 + days.div_euclid(365);
                let doy = days.rem_euclid(365);
                let month = DAY365_CUMULATIVE
                    .iter()
                    .rposition(|&c| c <= doy)
                    .unwrap_or(0);
                (
                    year,
                    month as u32 + 1,
                    (doy - DAY365_CUMULATIVE[month]) as u32 + 1,
                )
            }
        };
        Self {
            calendar,
            year,
            month,
            day,
            hour: (tod / 3_600) as u32,
            minute: (tod % 3_600 / 60) as u32,
            second: (tod % 60) as u32,
        }
    }

    /// Add nominal months, clamping the day into the target month.
    pub(crate) fn add_months(&self, months: i64) -> Self {
        let total = self.year * 12 + i64::from(self.month) - 1 + months;
        let year = total.div_euclid(12);
        let month = total.rem_euclid(12) as u32 + 1;
        let day = self.day.min(self.calendar.days_in_month(year, month));
        Self {
            year,
            month,
            day,
            ..*self
        }
    }
}

/// A point on the workflow's time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CyclePoint {
    Integer(i64),
    DateTime(DateTimePoint),
}

impl CyclePoint {
    /// True for the integer flavour.
    pub fn is_integer(&self) -> bool {
        matches!(self, CyclePoint::Integer(_))
    }

    /// Compare two points of the same flavour.
    ///
    /// Cross-flavour comparison is a [`PointError::FlavourMismatch`].
    pub fn try_cmp(&self, other: &CyclePoint) -> Result<Ordering, PointError> {
        match (self, other) {
            (CyclePoint::Integer(a), CyclePoint::Integer(b)) => Ok(a.cmp(b)),
            (CyclePoint::DateTime(a), CyclePoint::DateTime(b)) => {
                Ok(a.epoch_seconds().cmp(&b.epoch_seconds()))
            }
            _ => Err(PointError::FlavourMismatch(format!(
                "cannot compare {self} with {other}"
            ))),
        }
    }

    /// Add a duration. The duration flavour must match the point flavour.
    pub fn add(&self, duration: &Duration) -> Result<CyclePoint, PointError> {
        match (self, duration) {
            (CyclePoint::Integer(p), Duration::Integer(d)) => Ok(CyclePoint::Integer(p + d)),
            (CyclePoint::DateTime(p), Duration::Iso(d)) => {
                Ok(CyclePoint::DateTime(add_iso(p, d, 1)))
            }
            _ => Err(PointError::FlavourMismatch(format!(
                "cannot add {duration} to {self}"
            ))),
        }
    }

    /// Subtract a duration.
    pub fn sub(&self, duration: &Duration) -> Result<CyclePoint, PointError> {
        match (self, duration) {
            (CyclePoint::Integer(p), Duration::Integer(d)) => Ok(CyclePoint::Integer(p - d)),
            (CyclePoint::DateTime(p), Duration::Iso(d)) => {
                Ok(CyclePoint::DateTime(add_iso(p, d, -1)))
            }
            _ => Err(PointError::FlavourMismatch(format!(
                "cannot subtract {duration} from {self}"
            ))),
        }
    }

    /// Parse a point in the given cycling flavour.
    ///
    /// Integer mode accepts any signed integer. Date-time mode accepts
    /// basic (`20200101T0600Z`) and extended (`2020-01-01T06:00Z`) ISO
    /// forms, truncated forms (`2020`, `202001`, `20200101`), with missing
    /// components defaulted.
    pub fn parse(text: &str, calendar: Option<Calendar>) -> Result<CyclePoint, PointError> {
        match calendar {
            None => text
                .parse::<i64>()
                .map(CyclePoint::Integer)
                .map_err(|_| PointError::BadCyclePoint(format!("not an integer point: {text}"))),
            Some(calendar) => parse_datetime(text, calendar).map(CyclePoint::DateTime),
        }
    }
}

/// Apply an ISO duration with the given sign.
///
/// Years and months are nominal: applied first, clamping the day-of-month.
/// The fixed-width remainder goes through epoch-second arithmetic.
fn add_iso(point: &DateTimePoint, d: &IsoDuration, sign: i64) -> DateTimePoint {
    let sign = if d.negative { -sign } else { sign };
    let months = sign * (i64::from(d.years) * 12 + i64::from(d.months));
    let nominal = if months != 0 {
        point.add_months(months)
    } else {
        *point
    };
    let seconds = sign * d.fixed_seconds();
    if seconds == 0 {
        nominal
    } else {
        DateTimePoint::from_epoch_seconds(nominal.calendar, nominal.epoch_seconds() + seconds)
    }
}

impl PartialOrd for CyclePoint {
    /// `None` across flavours; total within one flavour.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.try_cmp(other).ok()
    }
}

impl fmt::Display for CyclePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CyclePoint::Integer(n) => write!(f, "{n}"),
            CyclePoint::DateTime(p) => write!(
                f,
                "{:04}{:02}{:02}T{:02}{:02}Z",
                p.year, p.month, p.day, p.hour, p.minute
            ),
        }
    }
}

fn parse_datetime(text: &str, calendar: Calendar) -> Result<DateTimePoint, PointError> {
    let bad = || PointError::BadCyclePoint(format!("unrecognised date-time point: {text}"));

    // Strip trailing UTC designator; local offsets are preserved verbatim
    // by not supporting them in point syntax at all.
    let trimmed = text.strip_suffix('Z').unwrap_or(text);
    let (date_part, time_part) = match trimmed.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (trimmed, None),
    };

    let digits: String = date_part.chars().filter(|c| *c != '-').collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(bad());
    }
    let (year, month, day) = match digits.len() {
        4 => (parse_num(&digits[0..4])?, 1, 1),
        6 => (parse_num(&digits[0..4])?, parse_num(&digits[4..6])? as u32, 1),
        8 => (
            parse_num(&digits[0..4])?,
            parse_num(&digits[4..6])? as u32,
            parse_num(&digits[6..8])? as u32,
        ),
        _ => return Err(bad()),
    };

    let (hour, minute, second) = match time_part {
        None => (0, 0, 0),
        Some(t) => {
            let tdigits: String = t.chars().filter(|c| *c != ':').collect();
            match tdigits.len() {
                2 => (parse_num(&tdigits[0..2])? as u32, 0, 0),
                4 => (
                    parse_num(&tdigits[0..2])? as u32,
                    parse_num(&tdigits[2..4])? as u32,
                    0,
                ),
                6 => (
                    parse_num(&tdigits[0..2])? as u32,
                    parse_num(&tdigits[2..4])? as u32,
                    parse_num(&tdigits[4..6])? as u32,
                ),
                _ => return Err(bad()),
            }
        }
    };

    if month == 0 || month > 12 || day == 0 || day > calendar.days_in_month(year, month) {
        return Err(bad());
    }
    if hour > 23 || minute > 59 || second > 59 {
        return Err(bad());
    }

    Ok(DateTimePoint {
        calendar,
        year,
        month,
        day,
        hour,
        minute,
        second,
    })
}

fn parse_num(s: &str) -> Result<i64, PointError> {
    s.parse::<i64>()
        .map_err(|_| PointError::BadCyclePoint(format!("not a number: {s}")))
}

#[cfg(test)]
#[path = "point_tests.rs"]
mod tests;
