// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod nutrition;
pub mod photo;

pub use nutrition::{
    CalorieDataPoint, MacroEntry, MacroPercentages, MacroSummary, MacroTarget,
};
pub use photo::{PhotoPaths, PhotoUrls};
