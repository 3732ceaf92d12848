// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durations: integer steps and ISO-8601 date-time intervals.

use crate::point::PointError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An ISO-8601 duration, split into nominal (years/months) and fixed
/// (weeks/days/time) parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct IsoDuration {
    pub negative: bool,
    pub years: u32,
    pub months: u32,
    pub weeks: u32,
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl IsoDuration {
    /// True when the duration carries nominal (calendar-dependent) parts.
    pub fn is_nominal(&self) -> bool {
        self.years > 0 || self.months > 0
    }

    /// Seconds contributed by the fixed-width parts (weeks and smaller).
    pub fn fixed_seconds(&self) -> i64 {
        i64::from(self.weeks) * 7 * 86_400
            + i64::from(self.days) * 86_400
            + i64::from(self.hours) * 3_600
            + i64::from(self.minutes) * 60
            + i64::from(self.seconds)
    }

    /// Total months in the nominal part.
    pub fn nominal_months(&self) -> i64 {
        i64::from(self.years) * 12 + i64::from(self.months)
    }

    fn is_zero(&self) -> bool {
        self.nominal_months() == 0 && self.fixed_seconds() == 0
    }
}

/// A duration in one of the two cycling flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Duration {
    Integer(i64),
    Iso(IsoDuration),
}

impl Duration {
    /// Parse `P1` (integer), `P1Y`, `PT6H`, `P1DT12H`, `-PT30M`.
    ///
    /// A bare `P<n>` with no designator letters is an integer duration;
    /// everything else is ISO.
    pub fn parse(text: &str) -> Result<Duration, PointError> {
        let bad = || PointError::BadDuration(text.to_string());

        let (negative, body) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let body = body.strip_prefix('P').ok_or_else(bad)?;
        if body.is_empty() {
            return Err(bad());
        }

        // Integer flavour: digits only after the P
        if body.chars().all(|c| c.is_ascii_digit()) {
            let n: i64 = body.parse().map_err(|_| bad())?;
            return Ok(Duration::Integer(if negative { -n } else { n }));
        }

        let mut dur = IsoDuration {
            negative,
            ..IsoDuration::default()
        };
        let (date_part, time_part) = match body.split_once('T') {
            Some((d, t)) => (d, Some(t)),
            None => (body, None),
        };

        for (value, unit) in designators(date_part).ok_or_else(bad)? {
            match unit {
                'Y' => dur.years = value,
                'M' => dur.months = value,
                'W' => dur.weeks = value,
                'D' => dur.days = value,
                _ => return Err(bad()),
            }
        }
        if let Some(time) = time_part {
            if time.is_empty() {
                return Err(bad());
            }
            for (value, unit) in designators(time).ok_or_else(bad)? {
                match unit {
                    'H' => dur.hours = value,
                    'M' => dur.minutes = value,
                    'S' => dur.seconds = value,
                    _ => return Err(bad()),
                }
            }
        }
        if dur.is_zero() {
            return Err(bad());
        }
        Ok(Duration::Iso(dur))
    }

    /// True when adding then subtracting does not round-trip exactly.
    pub fn is_nominal(&self) -> bool {
        match self {
            Duration::Integer(_) => false,
            Duration::Iso(d) => d.is_nominal(),
        }
    }

    /// Width in seconds for fixed durations; `None` for nominal ones.
    pub fn fixed_seconds(&self) -> Option<i64> {
        match self {
            Duration::Integer(_) => None,
            Duration::Iso(d) if d.is_nominal() => None,
            Duration::Iso(d) => Some(if d.negative {
                -d.fixed_seconds()
            } else {
                d.fixed_seconds()
            }),
        }
    }

    /// Convert to a std duration for timers. Nominal parts approximate
    /// (30-day months) since timers never span calendar boundaries exactly.
    pub fn to_std(&self) -> Result<std::time::Duration, PointError> {
        match self {
            Duration::Integer(_) => Err(PointError::BadDuration(
                "integer durations have no wall-clock width".to_string(),
            )),
            Duration::Iso(d) => {
                if d.negative {
                    return Err(PointError::BadDuration(
                        "negative duration has no wall-clock width".to_string(),
                    ));
                }
                let secs = d.nominal_months() * 30 * 86_400 + d.fixed_seconds();
                Ok(std::time::Duration::from_secs(secs as u64))
            }
        }
    }
}

/// Split `1Y2M3D` into `(1,'Y'), (2,'M'), (3,'D')` pairs.
fn designators(s: &str) -> Option<Vec<(u32, char)>> {
    let mut out = Vec::new();
    let mut num = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            num.push(c);
        } else if c.is_ascii_uppercase() && !num.is_empty() {
            out.push((num.parse().ok()?, c));
            num.clear();
        } else {
            return None;
        }
    }
    if num.is_empty() {
        Some(out)
    } else {
        None
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Duration::Integer(n) => {
                if *n < 0 {
                    write!(f, "-P{}", -n)
                } else {
                    write!(f, "P{n}")
                }
            }
            Duration::Iso(d) => {
                if d.negative {
                    write!(f, "-")?;
                }
                write!(f, "P")?;
                for (v, u) in [(d.years, 'Y'), (d.months, 'M'), (d.weeks, 'W'), (d.days, 'D')] {
                    if v > 0 {
                        write!(f, "{v}{u}")?;
                    }
                }
                if d.hours > 0 || d.minutes > 0 || d.seconds > 0 {
                    write!(f, "T")?;
                    for (v, u) in [(d.hours, 'H'), (d.minutes, 'M'), (d.seconds, 'S')] {
                        if v > 0 {
                            write!(f, "{v}{u}")?;
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[path = "duration_tests.rs"]
mod tests;
