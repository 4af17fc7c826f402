// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time parsing, formatting and wall-clock composition.
//!
//! Dates travel as `YYYY-MM-DD` strings and times as `HH:MM`. Both are parsed
//! strictly; anything else is rejected rather than turned into a bogus instant.

use crate::error::AppError;
use chrono::{
    DateTime, Days, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, SecondsFormat,
    TimeZone, Utc,
};
use chrono_tz::Tz;

/// Activity kind whose entries may end on the following day.
const OVERNIGHT_KIND: &str = "sleep";

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock backed by `Utc::now()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Format a calendar date as `YYYY-MM-DD`.
pub fn format_date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(date: &str) -> Result<NaiveDate, AppError> {
    // chrono accepts unpadded fields; the wire format does not.
    let bytes = date.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return Err(AppError::MalformedDateInput(format!(
            "expected YYYY-MM-DD, got '{}'",
            date
        )));
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| AppError::MalformedDateInput(format!("invalid date '{}': {}", date, e)))
}

/// Parse an `HH:MM` wall-clock time.
pub fn parse_time(time: &str) -> Result<NaiveTime, AppError> {
    let bytes = time.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return Err(AppError::MalformedDateInput(format!(
            "expected HH:MM, got '{}'",
            time
        )));
    }
    NaiveTime::parse_from_str(time, "%H:%M")
        .map_err(|e| AppError::MalformedDateInput(format!("invalid time '{}': {}", time, e)))
}

/// Resolve a local wall-clock time in `tz` to an absolute instant.
///
/// Ambiguous times (DST fall-back) resolve to the earlier instant. Times that
/// fall into a DST gap are read with the offset in force before the gap, which
/// lands them just after it.
pub fn local_to_utc(tz: Tz, naive: NaiveDateTime) -> Result<DateTime<Utc>, AppError> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => tz
            .offset_from_local_datetime(&(naive - chrono::Duration::days(1)))
            .earliest()
            .and_then(|offset| naive.and_local_timezone(offset.fix()).single())
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| {
                AppError::MalformedDateInput(format!("{} does not exist in {}", naive, tz.name()))
            }),
    }
}

/// Compose a calendar date and a wall-clock time in `tz` into one instant.
///
/// The date and time fields are combined directly, never through an
/// intermediate UTC or system-local parse.
pub fn build_date_time(tz: Tz, date: &str, time: &str) -> Result<DateTime<Utc>, AppError> {
    let date = parse_date(date)?;
    let time = parse_time(time)?;
    local_to_utc(tz, date.and_time(time))
}

/// Push the end of an overnight entry onto the next day.
///
/// For sleep entries whose end is not after the start, one calendar day (in
/// `tz`) is added to the end. Everything else is returned unchanged.
pub fn adjust_for_overnight_span(
    tz: Tz,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    kind: &str,
) -> Result<DateTime<Utc>, AppError> {
    if !kind.trim().eq_ignore_ascii_case(OVERNIGHT_KIND) || end > start {
        return Ok(end);
    }

    let local_end = end.with_timezone(&tz).naive_local();
    let next_day = local_end
        .checked_add_days(Days::new(1))
        .ok_or_else(|| AppError::MalformedDateInput(format!("{} is out of range", local_end)))?;
    local_to_utc(tz, next_day)
}
