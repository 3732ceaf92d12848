// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    integer_one     = { "P1", Duration::Integer(1) },
    integer_many    = { "P12", Duration::Integer(12) },
    integer_negative = { "-P2", Duration::Integer(-2) },
)]
fn parse_integer(input: &str, expected: Duration) {
    assert_eq!(Duration::parse(input).unwrap(), expected);
}

#[yare::parameterized(
    one_year    = { "P1Y", 0, true },
    six_hours   = { "PT6H", 6 * 3_600, false },
    day_and_time = { "P1DT12H", 36 * 3_600, false },
    two_weeks   = { "P2W", 14 * 86_400, false },
    seconds     = { "PT90S", 90, false },
)]
fn parse_iso(input: &str, fixed_secs: i64, nominal: bool) {
    let d = Duration::parse(input).unwrap();
    assert_eq!(d.is_nominal(), nominal, "{input}");
    if !nominal {
        assert_eq!(d.fixed_seconds(), Some(fixed_secs), "{input}");
    } else {
        assert_eq!(d.fixed_seconds(), None, "{input}");
    }
}

#[test]
fn parse_negative_iso() {
    let d = Duration::parse("-PT30M").unwrap();
    assert_eq!(d.fixed_seconds(), Some(-1_800));
}

#[yare::parameterized(
    no_p        = { "1Y" },
    empty       = { "P" },
    empty_time  = { "P1DT" },
    bad_unit    = { "P1X" },
    trailing    = { "P1Y2" },
    zero        = { "PT0S" },
    word        = { "tomorrow" },
)]
fn parse_rejects(input: &str) {
    assert!(Duration::parse(input).is_err(), "{input}");
}

#[yare::parameterized(
    integer   = { "P3" },
    year      = { "P1Y" },
    mixed     = { "P1Y2M3DT4H5M6S" },
    time_only = { "PT6H" },
    negative  = { "-PT30M" },
)]
fn display_round_trips(input: &str) {
    let d = Duration::parse(input).unwrap();
    assert_eq!(Duration::parse(&d.to_string()).unwrap(), d);
}

#[test]
fn to_std_widths() {
    assert_eq!(
        Duration::parse("PT90S").unwrap().to_std().unwrap(),
        std::time::Duration::from_secs(90)
    );
    // Nominal months approximate to 30 days for timer purposes
    assert_eq!(
        Duration::parse("P1M").unwrap().to_std().unwrap(),
        std::time::Duration::from_secs(30 * 86_400)
    );
    assert!(Duration::Integer(1).to_std().is_err());
}
