// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Journal routes: timezone preference, nutrition aggregates and activity spans.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::nutrition::{build_calorie_series, macro_percentages, sum_daily_macros};
use crate::models::{CalorieDataPoint, MacroEntry, MacroPercentages, MacroSummary, MacroTarget};
use crate::services::timezone::{
    common_timezones, detect_system_timezone, resolve_preferred_timezone, set_preferred_timezone,
    TimezoneOption, TimezonePreference,
};
use crate::time_utils::{adjust_for_overnight_span, build_date_time, format_utc_rfc3339};
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Browser-detected timezone sent by the client, used when no preference exists yet.
pub const TIMEZONE_HINT_HEADER: &str = "x-timezone";

const DEFAULT_SERIES_DAYS: u32 = 7;
const MAX_SERIES_DAYS: u32 = 366;

/// Journal routes (require authentication).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/timezone", get(get_timezone).put(put_timezone))
        .route("/api/timezone/common", get(get_common_timezones))
        .route("/api/nutrition/day-range", get(get_day_range))
        .route("/api/nutrition/summary", post(post_summary))
        .route("/api/nutrition/calorie-series", post(post_calorie_series))
        .route("/api/activities/span", post(post_activity_span))
}

/// The user's timezone, initializing it from the client hint (or the server's
/// own zone) on first use.
fn user_timezone(state: &AppState, user: &AuthUser, headers: &HeaderMap) -> TimezonePreference {
    let hint = headers
        .get(TIMEZONE_HINT_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| TimezonePreference::parse(h).ok());

    resolve_preferred_timezone(state.timezones.as_ref(), user.user_id, || {
        hint.unwrap_or_else(detect_system_timezone)
    })
}

// ─── Timezone ────────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TimezoneResponse {
    pub timezone: String,
    /// Current date in that timezone (`YYYY-MM-DD`)
    pub today: String,
}

async fn get_timezone(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
) -> Json<TimezoneResponse> {
    let tz = user_timezone(&state, &user, &headers);
    Json(TimezoneResponse {
        timezone: tz.name().to_string(),
        today: tz.current_local_date(state.clock.as_ref()),
    })
}

#[derive(Deserialize)]
struct SetTimezoneRequest {
    timezone: String,
}

async fn put_timezone(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<SetTimezoneRequest>,
) -> Result<Json<TimezoneResponse>> {
    let tz = set_preferred_timezone(state.timezones.as_ref(), user.user_id, &body.timezone)?;
    tracing::info!(user_id = user.user_id, timezone = %tz, "Timezone preference updated");

    Ok(Json(TimezoneResponse {
        timezone: tz.name().to_string(),
        today: tz.current_local_date(state.clock.as_ref()),
    }))
}

async fn get_common_timezones(State(state): State<Arc<AppState>>) -> Json<Vec<TimezoneOption>> {
    Json(common_timezones(state.clock.now()))
}

// ─── Nutrition ───────────────────────────────────────────────

#[derive(Deserialize)]
struct DayRangeQuery {
    date: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DayRangeResponse {
    pub timezone: String,
    /// First instant of the local day (RFC3339, UTC)
    pub start: String,
    /// Last millisecond of the local day (RFC3339, UTC)
    pub end: String,
}

/// UTC query bounds for one local day.
async fn get_day_range(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Query(params): Query<DayRangeQuery>,
) -> Result<Json<DayRangeResponse>> {
    let tz = user_timezone(&state, &user, &headers);
    let range = tz.local_day_range_utc(&params.date)?;

    Ok(Json(DayRangeResponse {
        timezone: tz.name().to_string(),
        start: format_utc_rfc3339(range.start),
        end: format_utc_rfc3339(range.end),
    }))
}

#[derive(Deserialize)]
struct SummaryRequest {
    entries: Vec<MacroEntry>,
    #[serde(default)]
    targets: Option<MacroTarget>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SummaryResponse {
    pub summary: MacroSummary,
    pub percentages: MacroPercentages,
}

/// Totals and target progress for one day's entries.
async fn post_summary(Json(body): Json<SummaryRequest>) -> Json<SummaryResponse> {
    let summary = sum_daily_macros(&body.entries);
    let percentages = macro_percentages(&summary, body.targets.as_ref());
    Json(SummaryResponse {
        summary,
        percentages,
    })
}

#[derive(Deserialize)]
struct CalorieSeriesRequest {
    entries_by_date: HashMap<String, Vec<MacroEntry>>,
    #[serde(default)]
    days: Option<u32>,
}

/// Daily calorie totals for the window ending today in the user's timezone.
async fn post_calorie_series(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Json(body): Json<CalorieSeriesRequest>,
) -> Result<Json<Vec<CalorieDataPoint>>> {
    let days = body.days.unwrap_or(DEFAULT_SERIES_DAYS);
    if days == 0 || days > MAX_SERIES_DAYS {
        return Err(AppError::BadRequest(format!(
            "days must be between 1 and {}",
            MAX_SERIES_DAYS
        )));
    }

    let tz = user_timezone(&state, &user, &headers);
    let today = tz.today(state.clock.as_ref());

    Ok(Json(build_calorie_series(&body.entries_by_date, days, today)))
}

// ─── Activity spans ──────────────────────────────────────────

#[derive(Deserialize)]
struct ActivitySpanRequest {
    date: String,
    start_time: String,
    /// Defaults to `date`
    #[serde(default)]
    end_date: Option<String>,
    end_time: String,
    kind: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ActivitySpanResponse {
    pub start: String,
    pub end: String,
}

/// Resolve a logged activity's wall-clock start/end into instants.
///
/// Sleep entries that end "before" they start are moved to end the next day.
async fn post_activity_span(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Json(body): Json<ActivitySpanRequest>,
) -> Result<Json<ActivitySpanResponse>> {
    let tz = user_timezone(&state, &user, &headers).tz();
    let end_date = body.end_date.as_deref().unwrap_or(&body.date);

    let start = build_date_time(tz, &body.date, &body.start_time)?;
    let end = build_date_time(tz, end_date, &body.end_time)?;
    let end = adjust_for_overnight_span(tz, start, end, &body.kind)?;

    Ok(Json(ActivitySpanResponse {
        start: format_utc_rfc3339(start),
        end: format_utc_rfc3339(end),
    }))
}
