// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user timezone preference and local-day arithmetic.
//!
//! Every "day" a user sees (today's log, a day's query range, a chart axis)
//! is a calendar day in the user's preferred timezone, never the server's.

use crate::error::AppError;
use crate::time_utils::{format_date_key, local_to_utc, parse_date, Clock};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Where Debian-style systems record the local zone name.
const SYSTEM_TIMEZONE_FILE: &str = "/etc/timezone";

/// Zones offered in the timezone picker.
const COMMON_TIMEZONES: &[&str] = &[
    "America/New_York",
    "America/Chicago",
    "America/Denver",
    "America/Los_Angeles",
    "America/Anchorage",
    "Pacific/Honolulu",
    "Europe/London",
    "Europe/Paris",
    "Europe/Berlin",
    "Europe/Rome",
    "Europe/Moscow",
    "Asia/Tokyo",
    "Asia/Shanghai",
    "Asia/Kolkata",
    "Asia/Dubai",
    "Australia/Sydney",
    "Australia/Melbourne",
    "Pacific/Auckland",
    "UTC",
];

/// A validated IANA timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimezonePreference(Tz);

impl TimezonePreference {
    pub const UTC: TimezonePreference = TimezonePreference(Tz::UTC);

    /// Parse an IANA identifier such as `Europe/Berlin`.
    pub fn parse(name: &str) -> Result<Self, AppError> {
        let trimmed = name.trim();
        trimmed
            .parse::<Tz>()
            .map(Self)
            .map_err(|_| AppError::InvalidTimezone(trimmed.to_string()))
    }

    pub fn tz(&self) -> Tz {
        self.0
    }

    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    /// Today's date in this timezone as `YYYY-MM-DD`.
    pub fn current_local_date(&self, clock: &dyn Clock) -> String {
        format_date_key(self.today(clock))
    }

    /// Today's calendar date in this timezone.
    pub fn today(&self, clock: &dyn Clock) -> NaiveDate {
        clock.now().with_timezone(&self.0).date_naive()
    }

    /// Absolute instants bounding local day `date`, both inclusive.
    pub fn local_day_range_utc(&self, date: &str) -> Result<DayRange, AppError> {
        let day = parse_date(date)?;
        let (Some(start), Some(end)) = (
            day.and_hms_opt(0, 0, 0),
            day.and_hms_milli_opt(23, 59, 59, 999),
        ) else {
            return Err(AppError::MalformedDateInput(format!("'{}' has no local day", date)));
        };

        Ok(DayRange {
            start: local_to_utc(self.0, start)?,
            end: local_to_utc(self.0, end)?,
        })
    }

    /// Calendar day (`YYYY-MM-DD`) that `instant` falls on in this timezone.
    pub fn utc_to_local_date(&self, instant: DateTime<Utc>) -> String {
        format_date_key(instant.with_timezone(&self.0).date_naive())
    }

    /// Format `instant` in this timezone with a `chrono` format string.
    pub fn format_in_timezone(&self, instant: DateTime<Utc>, fmt: &str) -> String {
        instant.with_timezone(&self.0).format(fmt).to_string()
    }
}

impl fmt::Display for TimezonePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Inclusive instant range covering one local day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayRange {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }
}

/// Picker entry for one timezone.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TimezoneOption {
    pub value: String,
    pub label: String,
    /// UTC offset at the time of the request, e.g. `-07:00`
    pub offset: String,
}

/// Common timezones with their current offsets, sorted by label.
pub fn common_timezones(now: DateTime<Utc>) -> Vec<TimezoneOption> {
    let mut options: Vec<TimezoneOption> = COMMON_TIMEZONES
        .iter()
        .filter_map(|name| TimezonePreference::parse(name).ok())
        .map(|tz| {
            let offset = tz.format_in_timezone(now, "%:z");
            let label = tz.name().replacen('_', " ", 1).replacen('/', " - ", 1);
            TimezoneOption {
                value: tz.name().to_string(),
                label: format!("{} ({})", label, offset),
                offset,
            }
        })
        .collect();

    options.sort_by(|a, b| a.label.cmp(&b.label));
    options
}

// ─── Detection ───────────────────────────────────────────────────────────────

/// Detect the runtime's timezone, falling back to UTC.
///
/// Checks `TZ`, then `/etc/timezone`. A fallback is logged so systematic
/// detection failures show up in the logs.
pub fn detect_system_timezone() -> TimezonePreference {
    let from_env = std::env::var("TZ").ok();
    let from_file = || std::fs::read_to_string(SYSTEM_TIMEZONE_FILE).ok();
    detect_from(from_env, from_file)
}

fn detect_from(
    from_env: Option<String>,
    from_file: impl FnOnce() -> Option<String>,
) -> TimezonePreference {
    // POSIX allows a leading ':' in TZ.
    let env_name = from_env.map(|v| v.trim().trim_start_matches(':').to_string());

    if let Some(tz) = env_name
        .as_deref()
        .filter(|v| !v.is_empty())
        .and_then(|v| TimezonePreference::parse(v).ok())
    {
        return tz;
    }

    if let Some(tz) = from_file().and_then(|v| TimezonePreference::parse(&v).ok()) {
        return tz;
    }

    tracing::warn!(
        tz_env = ?env_name,
        "Timezone detection failed, falling back to UTC"
    );
    TimezonePreference::UTC
}

// ─── Preference storage ──────────────────────────────────────────────────────

/// Persistent per-user timezone preference.
pub trait TimezonePreferenceStore: Send + Sync {
    fn get(&self, user_id: u64) -> Option<String>;
    fn set(&self, user_id: u64, timezone: &str);
}

/// In-process preference store.
#[derive(Default)]
pub struct InMemoryTimezoneStore {
    preferences: DashMap<u64, String>,
}

impl InMemoryTimezoneStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimezonePreferenceStore for InMemoryTimezoneStore {
    fn get(&self, user_id: u64) -> Option<String> {
        self.preferences.get(&user_id).map(|v| v.value().clone())
    }

    fn set(&self, user_id: u64, timezone: &str) {
        self.preferences.insert(user_id, timezone.to_string());
    }
}

/// Return the user's stored timezone, or detect, persist and return one.
///
/// A stored value that no longer parses is replaced as if it were missing.
pub fn resolve_preferred_timezone(
    store: &dyn TimezonePreferenceStore,
    user_id: u64,
    detect: impl FnOnce() -> TimezonePreference,
) -> TimezonePreference {
    if let Some(stored) = store.get(user_id) {
        match TimezonePreference::parse(&stored) {
            Ok(tz) => return tz,
            Err(_) => tracing::warn!(
                user_id,
                stored = %stored,
                "Stored timezone is invalid, re-detecting"
            ),
        }
    }

    let detected = detect();
    store.set(user_id, detected.name());
    tracing::info!(user_id, timezone = %detected, "Initialized timezone preference");
    detected
}

/// Overwrite the user's timezone preference after validating it.
pub fn set_preferred_timezone(
    store: &dyn TimezonePreferenceStore,
    user_id: u64,
    timezone: &str,
) -> Result<TimezonePreference, AppError> {
    let tz = TimezonePreference::parse(timezone)?;
    store.set(user_id, tz.name());
    Ok(tz)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_utils::format_utc_rfc3339;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn instant(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(TimezonePreference::parse("America/Los_Angeles").is_ok());
        assert!(matches!(
            TimezonePreference::parse("Mars/Olympus_Mons"),
            Err(AppError::InvalidTimezone(_))
        ));
        assert!(TimezonePreference::parse("").is_err());
    }

    #[test]
    fn test_current_local_date_differs_from_utc() {
        // 02:00 UTC is still the previous evening in Los Angeles.
        let clock = FixedClock(instant("2024-03-11T02:00:00Z"));
        let la = TimezonePreference::parse("America/Los_Angeles").unwrap();
        assert_eq!(la.current_local_date(&clock), "2024-03-10");
        assert_eq!(TimezonePreference::UTC.current_local_date(&clock), "2024-03-11");
    }

    #[test]
    fn test_local_day_range() {
        let tokyo = TimezonePreference::parse("Asia/Tokyo").unwrap();
        let range = tokyo.local_day_range_utc("2024-03-10").unwrap();
        assert_eq!(format_utc_rfc3339(range.start), "2024-03-09T15:00:00.000Z");
        assert_eq!(format_utc_rfc3339(range.end), "2024-03-10T14:59:59.999Z");
    }

    #[test]
    fn test_local_day_range_on_dst_change_is_23_hours() {
        let ny = TimezonePreference::parse("America/New_York").unwrap();
        let range = ny.local_day_range_utc("2024-03-10").unwrap();
        let length = range.end - range.start + chrono::Duration::milliseconds(1);
        assert_eq!(length, chrono::Duration::hours(23));
    }

    #[test]
    fn test_local_day_range_rejects_bad_date() {
        assert!(matches!(
            TimezonePreference::UTC.local_day_range_utc("03/10/2024"),
            Err(AppError::MalformedDateInput(_))
        ));
    }

    #[test]
    fn test_common_timezones_sorted_with_offsets() {
        let options = common_timezones(instant("2024-01-15T12:00:00Z"));
        assert_eq!(options.len(), COMMON_TIMEZONES.len());
        assert!(options.windows(2).all(|w| w[0].label <= w[1].label));

        let la = options
            .iter()
            .find(|o| o.value == "America/Los_Angeles")
            .unwrap();
        assert_eq!(la.offset, "-08:00");
        assert_eq!(la.label, "America - Los Angeles (-08:00)");
    }

    #[test]
    fn test_detect_prefers_env_then_file_then_utc() {
        let tz = detect_from(Some(":Europe/Paris".to_string()), || None);
        assert_eq!(tz.name(), "Europe/Paris");

        let tz = detect_from(Some("bogus".to_string()), || {
            Some("Asia/Kolkata\n".to_string())
        });
        assert_eq!(tz.name(), "Asia/Kolkata");

        let tz = detect_from(None, || None);
        assert_eq!(tz, TimezonePreference::UTC);
    }

    #[test]
    fn test_resolve_detects_once_and_persists() {
        let store = InMemoryTimezoneStore::new();
        let berlin = TimezonePreference::parse("Europe/Berlin").unwrap();

        let first = resolve_preferred_timezone(&store, 7, || berlin);
        assert_eq!(first, berlin);
        assert_eq!(store.get(7).as_deref(), Some("Europe/Berlin"));

        let second = resolve_preferred_timezone(&store, 7, || {
            panic!("detection must not run once a preference is stored")
        });
        assert_eq!(second, berlin);
    }

    #[test]
    fn test_resolve_replaces_invalid_stored_value() {
        let store = InMemoryTimezoneStore::new();
        store.set(1, "Not/AZone");
        let tz = resolve_preferred_timezone(&store, 1, || TimezonePreference::UTC);
        assert_eq!(tz, TimezonePreference::UTC);
        assert_eq!(store.get(1).as_deref(), Some("UTC"));
    }

    #[test]
    fn test_set_validates_before_overwriting() {
        let store = InMemoryTimezoneStore::new();
        set_preferred_timezone(&store, 1, "Asia/Tokyo").unwrap();

        let err = set_preferred_timezone(&store, 1, "Nowhere/Special").unwrap_err();
        assert!(matches!(err, AppError::InvalidTimezone(_)));
        assert_eq!(store.get(1).as_deref(), Some("Asia/Tokyo"));
    }
}
