// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Fitness-Journal: nutrition and progress-photo tracking backend
//!
//! This crate provides the API pieces that need care beyond plain CRUD:
//! a signed-URL cache for private progress photos, and timezone-correct
//! date handling and aggregation for nutrition logs.

pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use services::{PhotoUrlService, TimezonePreferenceStore};
use std::sync::Arc;
use time_utils::Clock;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub photo_urls: PhotoUrlService,
    pub timezones: Arc<dyn TimezonePreferenceStore>,
    pub clock: Arc<dyn Clock>,
}
