// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Nutrition records and the per-day aggregates derived from them.
//!
//! Macro entries arrive from the relational store with gram values serialized
//! either as numbers or as numeric strings. Anything that does not parse to a
//! finite number counts as zero.

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::time_utils::format_date_key;

/// kcal per gram of protein.
pub const PROTEIN_KCAL_PER_GRAM: f64 = 4.0;
/// kcal per gram of fat.
pub const FAT_KCAL_PER_GRAM: f64 = 9.0;
/// kcal per gram of carbohydrate.
pub const CARBS_KCAL_PER_GRAM: f64 = 4.0;

/// A logged food item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroEntry {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub description: String,
    /// Protein in grams
    #[serde(default, deserialize_with = "lenient_grams")]
    pub protein: f64,
    /// Fat in grams
    #[serde(default, deserialize_with = "lenient_grams")]
    pub fats: f64,
    /// Carbohydrate in grams
    #[serde(default, deserialize_with = "lenient_grams")]
    pub carbs: f64,
    /// Explicit calorie count, overriding the gram-derived value when positive
    #[serde(default, deserialize_with = "lenient_optional_grams")]
    pub calories: Option<f64>,
    /// Calendar day the entry belongs to (`YYYY-MM-DD`, timezone-naive)
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl MacroEntry {
    /// Calories contributed by this entry.
    pub fn calories(&self) -> f64 {
        match self.calories.map(finite_or_zero) {
            Some(explicit) if explicit > 0.0 => explicit,
            _ => calculate_calories(
                finite_or_zero(self.protein),
                finite_or_zero(self.fats),
                finite_or_zero(self.carbs),
            ),
        }
    }
}

/// Daily macro targets for a user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MacroTarget {
    #[serde(default)]
    pub user_id: i64,
    #[serde(default, deserialize_with = "lenient_grams")]
    pub protein_target: f64,
    #[serde(default, deserialize_with = "lenient_grams")]
    pub fats_target: f64,
    #[serde(default, deserialize_with = "lenient_grams")]
    pub carbs_target: f64,
}

/// Totals for one day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MacroSummary {
    pub protein: f64,
    pub fats: f64,
    pub carbs: f64,
    pub total_calories: f64,
}

/// One point of a calorie chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CalorieDataPoint {
    /// `YYYY-MM-DD`
    pub date: String,
    pub value: f64,
}

/// Progress toward each macro target, in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MacroPercentages {
    pub protein: f64,
    pub fats: f64,
    pub carbs: f64,
}

/// Calories for the given macro grams.
pub fn calculate_calories(protein: f64, fats: f64, carbs: f64) -> f64 {
    protein * PROTEIN_KCAL_PER_GRAM + fats * FAT_KCAL_PER_GRAM + carbs * CARBS_KCAL_PER_GRAM
}

/// Sum a day's entries.
///
/// Each column is summed over its sorted values, so the result is identical
/// for any ordering of `entries`.
pub fn sum_daily_macros(entries: &[MacroEntry]) -> MacroSummary {
    MacroSummary {
        protein: ordered_sum(entries.iter().map(|e| e.protein)),
        fats: ordered_sum(entries.iter().map(|e| e.fats)),
        carbs: ordered_sum(entries.iter().map(|e| e.carbs)),
        total_calories: ordered_sum(entries.iter().map(MacroEntry::calories)),
    }
}

/// Daily calorie totals for the `window_days` days ending on `today`.
///
/// Oldest first. Days without entries contribute a zero point, so the series
/// length is always `window_days`.
pub fn build_calorie_series(
    entries_by_date: &HashMap<String, Vec<MacroEntry>>,
    window_days: u32,
    today: NaiveDate,
) -> Vec<CalorieDataPoint> {
    (0..window_days)
        .rev()
        .filter_map(|offset| today.checked_sub_days(Days::new(u64::from(offset))))
        .map(|day| {
            let date = format_date_key(day);
            let value = entries_by_date
                .get(&date)
                .map(|entries| sum_daily_macros(entries).total_calories)
                .unwrap_or(0.0);
            CalorieDataPoint { date, value }
        })
        .collect()
}

/// Percent of each target reached; zero where the target is unset or zero.
pub fn macro_percentages(current: &MacroSummary, targets: Option<&MacroTarget>) -> MacroPercentages {
    let Some(targets) = targets else {
        return MacroPercentages::default();
    };

    MacroPercentages {
        protein: percent_of(current.protein, targets.protein_target),
        fats: percent_of(current.fats, targets.fats_target),
        carbs: percent_of(current.carbs, targets.carbs_target),
    }
}

fn percent_of(value: f64, target: f64) -> f64 {
    if target > 0.0 && target.is_finite() {
        value / target * 100.0
    } else {
        0.0
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn ordered_sum(values: impl Iterator<Item = f64>) -> f64 {
    let mut values: Vec<f64> = values.map(finite_or_zero).collect();
    values.sort_by(f64::total_cmp);
    values.into_iter().sum()
}

// ─── Lenient numeric decoding ────────────────────────────────

fn numeric_value(value: &serde_json::Value) -> Option<f64> {
    let n = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn lenient_grams<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(numeric_value).unwrap_or(0.0))
}

fn lenient_optional_grams<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<f64>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(numeric_value))
}
