// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod photo_urls;
pub mod storage;
pub mod timezone;

pub use photo_urls::{PhotoUrlService, PhotoUrlSettings};
pub use storage::{SignedUrlGenerator, StorageClient};
pub use timezone::{
    InMemoryTimezoneStore, TimezonePreference, TimezonePreferenceStore,
};
