// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn int_ctx(initial: i64, final_point: Option<i64>) -> RecurrenceContext {
    RecurrenceContext {
        calendar: None,
        initial: CyclePoint::Integer(initial),
        final_point: final_point.map(CyclePoint::Integer),
    }
}

fn date_ctx(initial: &str, final_point: Option<&str>) -> RecurrenceContext {
    RecurrenceContext {
        calendar: Some(Calendar::Gregorian),
        initial: CyclePoint::parse(initial, Some(Calendar::Gregorian)).unwrap(),
        final_point: final_point
            .map(|p| CyclePoint::parse(p, Some(Calendar::Gregorian)).unwrap()),
    }
}

fn dt(text: &str) -> CyclePoint {
    CyclePoint::parse(text, Some(Calendar::Gregorian)).unwrap()
}

#[test]
fn bare_period_starts_at_workflow_initial() {
    let r = Recurrence::parse("P2", &int_ctx(1, Some(9))).unwrap();
    assert_eq!(
        r.first_on_or_after(&CyclePoint::Integer(1)).unwrap(),
        Some(CyclePoint::Integer(1))
    );
    assert_eq!(
        r.next_after(&CyclePoint::Integer(1)).unwrap(),
        Some(CyclePoint::Integer(3))
    );
}

#[test]
fn final_point_bounds_the_sequence() {
    let r = Recurrence::parse("P2", &int_ctx(1, Some(5))).unwrap();
    assert_eq!(
        r.next_after(&CyclePoint::Integer(5)).unwrap(),
        None,
        "exhausted past the final point"
    );
}

#[test]
fn repetition_count_bounds_the_sequence() {
    let r = Recurrence::parse("R3/2/P1", &int_ctx(1, None)).unwrap();
    assert_eq!(
        r.first_on_or_after(&CyclePoint::Integer(0)).unwrap(),
        Some(CyclePoint::Integer(2))
    );
    assert_eq!(
        r.next_after(&CyclePoint::Integer(3)).unwrap(),
        Some(CyclePoint::Integer(4))
    );
    assert_eq!(r.next_after(&CyclePoint::Integer(4)).unwrap(), None);
}

#[test]
fn r1_is_a_single_point() {
    let r = Recurrence::parse("R1", &int_ctx(7, None)).unwrap();
    assert_eq!(
        r.first_on_or_after(&CyclePoint::Integer(0)).unwrap(),
        Some(CyclePoint::Integer(7))
    );
    assert_eq!(r.next_after(&CyclePoint::Integer(7)).unwrap(), None);
}

#[test]
fn caret_resolves_to_workflow_initial() {
    let r = Recurrence::parse("R1/^", &int_ctx(4, None)).unwrap();
    assert!(r.contains(&CyclePoint::Integer(4)).unwrap());
}

#[test]
fn datetime_yearly() {
    let ctx = date_ctx("2020", Some("2030"));
    let r = Recurrence::parse("P1Y", &ctx).unwrap();
    assert_eq!(
        r.next_after(&dt("2020")).unwrap(),
        Some(dt("2021")),
        "yearly step"
    );
    assert_eq!(
        r.first_on_or_after(&dt("20250615")).unwrap(),
        Some(dt("2026"))
    );
    assert_eq!(r.next_after(&dt("2030")).unwrap(), None);
}

#[test]
fn datetime_six_hourly_is_o1_from_a_far_bound() {
    let ctx = date_ctx("2020", None);
    let r = Recurrence::parse("PT6H", &ctx).unwrap();
    // A bound decades ahead still answers without stepping
    assert_eq!(
        r.first_on_or_after(&dt("20600101T0300Z")).unwrap(),
        Some(dt("20600101T0600Z"))
    );
}

#[test]
fn explicit_start_and_period() {
    let ctx = date_ctx("2020", None);
    let r = Recurrence::parse("R/20200106/P1D", &ctx).unwrap();
    assert_eq!(
        r.first_on_or_after(&dt("2020")).unwrap(),
        Some(dt("20200106"))
    );
}

#[test]
fn start_end_with_count_divides_evenly() {
    let ctx = date_ctx("2020", None);
    let r = Recurrence::parse("R5/20200101/20200105", &ctx).unwrap();
    assert_eq!(
        r.first_on_or_after(&dt("20200102")).unwrap(),
        Some(dt("20200102"))
    );
    assert_eq!(r.next_after(&dt("20200105")).unwrap(), None);
}

#[test]
fn exclusions_are_skipped() {
    let r = Recurrence::parse("P1!3", &int_ctx(1, Some(5))).unwrap();
    assert_eq!(
        r.next_after(&CyclePoint::Integer(2)).unwrap(),
        Some(CyclePoint::Integer(4))
    );
    assert!(!r.contains(&CyclePoint::Integer(3)).unwrap());
}

#[test]
fn exclusion_list_in_parens() {
    let r = Recurrence::parse("P1!(2,4)", &int_ctx(1, Some(5))).unwrap();
    assert_eq!(
        r.next_after(&CyclePoint::Integer(1)).unwrap(),
        Some(CyclePoint::Integer(3))
    );
    assert_eq!(
        r.next_after(&CyclePoint::Integer(3)).unwrap(),
        Some(CyclePoint::Integer(5))
    );
}

#[yare::parameterized(
    zero_count    = { "R0/1/P1" },
    too_many_parts = { "1/P1/2/3" },
    bad_point     = { "R1/banana" },
)]
fn parse_rejects(input: &str) {
    assert!(Recurrence::parse(input, &int_ctx(1, None)).is_err(), "{input}");
}

#[test]
fn monthly_clamps_day() {
    let ctx = date_ctx("20200131", None);
    let r = Recurrence::parse("P1M", &ctx).unwrap();
    assert_eq!(
        r.next_after(&dt("20200131")).unwrap(),
        Some(dt("20200229")),
        "31st clamps to February's last day"
    );
}
