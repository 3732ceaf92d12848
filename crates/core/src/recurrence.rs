// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recurrence expansion: `Rn/start/period` style repeating intervals.
//!
//! A recurrence lazily enumerates cycle points forward from its initial
//! point. For fixed-width and pure-nominal periods, the first point on or
//! after a bound is computed arithmetically rather than by stepping.

use crate::duration::Duration;
use crate::point::{Calendar, CyclePoint, DateTimePoint, PointError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A repeating sequence of cycle points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recurrence {
    pub initial: CyclePoint,
    pub period: Duration,
    /// Inclusive upper bound; `None` for unbounded.
    pub final_point: Option<CyclePoint>,
    /// Repetition count; `None` for unbounded.
    pub count: Option<u64>,
    /// Points excluded from the sequence.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclusions: Vec<CyclePoint>,
}

/// Context needed to resolve recurrence shorthand against a workflow.
#[derive(Debug, Clone, Copy)]
pub struct RecurrenceContext {
    pub calendar: Option<Calendar>,
    pub initial: CyclePoint,
    pub final_point: Option<CyclePoint>,
}

impl Recurrence {
    /// Parse a recurrence expression.
    ///
    /// Accepted forms, with `^` standing for the workflow initial point:
    /// - `R<n>/<start>/<period>` — n repetitions
    /// - `R/<start>/<period>` or `<start>/<period>` — unbounded
    /// - `R<n>/<start>/<end>` — n repetitions ending at a point
    /// - `R1/<start>` or `R1` — a single point
    /// - `<period>` — unbounded from the workflow initial point
    ///
    /// An optional `!point` or `!(p1,p2)` suffix excludes points.
    pub fn parse(text: &str, ctx: &RecurrenceContext) -> Result<Recurrence, PointError> {
        let (body, exclusions) = split_exclusions(text, ctx)?;

        let mut count = None;
        let mut parts: Vec<&str> = body.split('/').collect();

        if let Some(first) = parts.first().copied() {
            if let Some(rest) = first.strip_prefix('R') {
                parts.remove(0);
                if !rest.is_empty() {
                    let n: u64 = rest.parse().map_err(|_| {
                        PointError::BadCyclePoint(format!("bad repetition count: {first}"))
                    })?;
                    if n == 0 {
                        return Err(PointError::BadCyclePoint(format!(
                            "repetition count must be positive: {text}"
                        )));
                    }
                    count = Some(n);
                }
            }
        }

        let parse_point = |s: &str| -> Result<CyclePoint, PointError> {
            if s == "^" {
                Ok(ctx.initial)
            } else if s == "$" {
                ctx.final_point.ok_or_else(|| {
                    PointError::BadCyclePoint("`$` used but no final cycle point".to_string())
                })
            } else {
                CyclePoint::parse(s, ctx.calendar)
            }
        };

        match parts.as_slice() {
            // R1 or R1/<start>: a single point
            [] if count == Some(1) => Ok(Recurrence {
                initial: ctx.initial,
                period: one_step(ctx),
                final_point: None,
                count: Some(1),
                exclusions,
            }),
            [start] if count == Some(1) => Ok(Recurrence {
                initial: parse_point(start)?,
                period: one_step(ctx),
                final_point: None,
                count: Some(1),
                exclusions,
            }),
            // Bare period: repeat from the workflow initial point
            [period] if count.is_none() && is_duration(period) => Ok(Recurrence {
                initial: ctx.initial,
                period: Duration::parse(period)?,
                final_point: ctx.final_point,
                count,
                exclusions,
            }),
            [start, second] => {
                let initial = parse_point(start)?;
                if is_duration(second) {
                    Ok(Recurrence {
                        initial,
                        period: Duration::parse(second)?,
                        final_point: ctx.final_point,
                        count,
                        exclusions,
                    })
                } else {
                    // R<n>/<start>/<end>: derive the period by even division
                    let end = parse_point(second)?;
                    let n = count.ok_or_else(|| {
                        PointError::BadCyclePoint(format!(
                            "start/end recurrence needs a repetition count: {text}"
                        ))
                    })?;
                    let period = divided_period(&initial, &end, n)?;
                    Ok(Recurrence {
                        initial,
                        period,
                        final_point: Some(end),
                        count: Some(n),
                        exclusions,
                    })
                }
            }
            _ => Err(PointError::BadCyclePoint(format!(
                "unrecognised recurrence: {text}"
            ))),
        }
    }

    /// The n-th point of the sequence (0-based), ignoring bounds.
    fn nth_unchecked(&self, n: u64) -> Result<CyclePoint, PointError> {
        match (&self.initial, &self.period) {
            (CyclePoint::Integer(start), Duration::Integer(step)) => {
                Ok(CyclePoint::Integer(start + step * n as i64))
            }
            (CyclePoint::DateTime(start), Duration::Iso(iso)) => {
                // The nth point is one scaled jump from the initial point,
                // not n accumulated steps: stepping would compound the
                // day-of-month clamp (P1M from Jan 31 must give Mar 31,
                // not Mar 29).
                let sign: i64 = if iso.negative { -1 } else { 1 };
                let months = sign * iso.nominal_months() * n as i64;
                let nominal = if months != 0 {
                    start.add_months(months)
                } else {
                    *start
                };
                let seconds = sign * iso.fixed_seconds() * n as i64;
                if seconds == 0 {
                    Ok(CyclePoint::DateTime(nominal))
                } else {
                    Ok(CyclePoint::DateTime(DateTimePoint::from_epoch_seconds(
                        nominal.calendar,
                        nominal.epoch_seconds() + seconds,
                    )))
                }
            }
            _ => Err(PointError::FlavourMismatch(format!(
                "recurrence mixes {} and {}",
                self.initial, self.period
            ))),
        }
    }

    /// Index of the first point at or after `bound`, or `None` if the
    /// bound precedes the sequence entirely (index 0 applies).
    fn index_on_or_after(&self, bound: &CyclePoint) -> Result<u64, PointError> {
        if self.initial.try_cmp(bound)? != Ordering::Less {
            return Ok(0);
        }
        match (&self.initial, &self.period, bound) {
            (CyclePoint::Integer(start), Duration::Integer(step), CyclePoint::Integer(b)) => {
                if *step <= 0 {
                    return Err(PointError::BadDuration(format!(
                        "recurrence period must be positive: {}",
                        self.period
                    )));
                }
                Ok(((b - start) as u64).div_ceil(*step as u64))
            }
            (CyclePoint::DateTime(start), Duration::Iso(iso), CyclePoint::DateTime(b)) => {
                if let Some(secs) = self.period.fixed_seconds() {
                    if secs <= 0 {
                        return Err(PointError::BadDuration(format!(
                            "recurrence period must be positive: {}",
                            self.period
                        )));
                    }
                    let gap = b.epoch_seconds() - start.epoch_seconds();
                    return Ok((gap as u64).div_ceil(secs as u64));
                }
                if iso.fixed_seconds() == 0 {
                    // Pure nominal: month arithmetic, then correct for clamping
                    let step_months = iso.nominal_months() as u64;
                    let gap_months = ((b.year - start.year) * 12
                        + i64::from(b.month)
                        - i64::from(start.month)) as u64;
                    let mut idx = gap_months / step_months;
                    while self.nth_unchecked(idx)?.try_cmp(bound)? == Ordering::Less {
                        idx += 1;
                    }
                    Ok(idx)
                } else {
                    // Mixed nominal+fixed: step forward
                    let mut idx = 0u64;
                    while self.nth_unchecked(idx)?.try_cmp(bound)? == Ordering::Less {
                        idx += 1;
                    }
                    Ok(idx)
                }
            }
            _ => Err(PointError::FlavourMismatch(format!(
                "recurrence bound {bound} does not match {}",
                self.initial
            ))),
        }
    }

    /// The point at index n, or `None` when past the count or final bound.
    fn point_at(&self, n: u64) -> Result<Option<CyclePoint>, PointError> {
        if let Some(count) = self.count {
            if n >= count {
                return Ok(None);
            }
        }
        let p = self.nth_unchecked(n)?;
        if let Some(fp) = &self.final_point {
            if p.try_cmp(fp)? == Ordering::Greater {
                return Ok(None);
            }
        }
        Ok(Some(p))
    }

    /// Earliest point ≥ `bound`, skipping exclusions; `None` if exhausted.
    pub fn first_on_or_after(&self, bound: &CyclePoint) -> Result<Option<CyclePoint>, PointError> {
        let mut idx = self.index_on_or_after(bound)?;
        loop {
            match self.point_at(idx)? {
                None => return Ok(None),
                Some(p) if self.exclusions.contains(&p) => idx += 1,
                Some(p) => return Ok(Some(p)),
            }
        }
    }

    /// Smallest point strictly greater than `after`; `None` if exhausted.
    pub fn next_after(&self, after: &CyclePoint) -> Result<Option<CyclePoint>, PointError> {
        let mut idx = self.index_on_or_after(after)?;
        loop {
            match self.point_at(idx)? {
                None => return Ok(None),
                Some(p)
                    if p.try_cmp(after)? == Ordering::Greater
                        && !self.exclusions.contains(&p) =>
                {
                    return Ok(Some(p))
                }
                Some(_) => idx += 1,
            }
        }
    }

    /// True when `point` is a member of the sequence.
    pub fn contains(&self, point: &CyclePoint) -> Result<bool, PointError> {
        Ok(self.first_on_or_after(point)? == Some(*point))
    }
}

/// The implicit period for `R1` recurrences: one integer step or one day.
fn one_step(ctx: &RecurrenceContext) -> Duration {
    match ctx.calendar {
        None => Duration::Integer(1),
        Some(_) => Duration::Iso(crate::duration::IsoDuration {
            days: 1,
            ..Default::default()
        }),
    }
}

fn is_duration(s: &str) -> bool {
    s.starts_with('P') || s.starts_with("-P") || s.starts_with("+P")
}

/// Period for `R<n>/<start>/<end>`: the gap divided into n-1 even steps.
fn divided_period(start: &CyclePoint, end: &CyclePoint, n: u64) -> Result<Duration, PointError> {
    let steps = n.saturating_sub(1).max(1) as i64;
    match (start, end) {
        (CyclePoint::Integer(a), CyclePoint::Integer(b)) => {
            Ok(Duration::Integer(((b - a) / steps).max(1)))
        }
        (CyclePoint::DateTime(a), CyclePoint::DateTime(b)) => {
            let gap = (b.epoch_seconds() - a.epoch_seconds()) / steps;
            Ok(Duration::Iso(crate::duration::IsoDuration {
                seconds: (gap % 60) as u32,
                minutes: (gap / 60 % 60) as u32,
                hours: (gap / 3_600 % 24) as u32,
                days: (gap / 86_400) as u32,
                ..Default::default()
            }))
        }
        _ => Err(PointError::FlavourMismatch(format!(
            "recurrence bounds {start} and {end} differ in flavour"
        ))),
    }
}

/// Split a trailing `!point` or `!(p1,p2,...)` exclusion suffix.
fn split_exclusions(
    text: &str,
    ctx: &RecurrenceContext,
) -> Result<(String, Vec<CyclePoint>), PointError> {
    let Some((body, excl)) = text.split_once('!') else {
        return Ok((text.trim().to_string(), Vec::new()));
    };
    let excl = excl.trim();
    let inner = excl
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(excl);
    let mut points = Vec::new();
    for part in inner.split(',') {
        let part = part.trim();
        if part == "^" {
            points.push(ctx.initial);
        } else {
            points.push(CyclePoint::parse(part, ctx.calendar)?);
        }
    }
    Ok((body.trim().to_string(), points))
}

#[cfg(test)]
#[path = "recurrence_tests.rs"]
mod tests;
