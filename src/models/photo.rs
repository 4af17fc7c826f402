// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Photo storage references and their signed-URL view.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Storage paths of one progress photo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoPaths {
    pub id: i64,
    /// Full-size image path inside the photos bucket
    pub image_path: String,
    /// Thumbnail path inside the photos bucket
    pub thumbnail_path: String,
}

impl PhotoPaths {
    /// Both storage paths, image first.
    pub fn paths(&self) -> [&str; 2] {
        [&self.image_path, &self.thumbnail_path]
    }
}

/// Bucket folder holding everything a user uploaded.
pub fn user_folder(user_id: u64) -> String {
    format!("user_{}", user_id)
}

/// Whether `path` lies inside the user's folder.
///
/// Paths with empty, `.` or `..` segments are never owned by anyone.
pub fn is_owned_by(path: &str, user_id: u64) -> bool {
    let mut segments = path.split('/');
    if segments.next() != Some(user_folder(user_id).as_str()) {
        return false;
    }

    let mut rest = segments.peekable();
    rest.peek().is_some() && rest.all(|s| !s.is_empty() && s != "." && s != "..")
}

/// Photo as returned to clients: signed URLs only, never storage paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PhotoUrls {
    pub id: i64,
    pub image_url: Option<String>,
    pub thumbnail_url: Option<String>,
}
