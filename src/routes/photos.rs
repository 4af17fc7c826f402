// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Photo URL routes.
//!
//! Photo records themselves live in the relational store; these handlers only
//! turn storage paths the caller owns into signed URLs.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::photo::is_owned_by;
use crate::models::{PhotoPaths, PhotoUrls};
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Upper bound on paths per batch request.
const MAX_PATHS_PER_REQUEST: usize = 200;
const MAX_PATH_LENGTH: usize = 512;

/// Photo routes (require authentication).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/photos/signed-url", get(get_signed_url))
        .route("/api/photos/signed-urls", post(get_signed_urls))
        .route("/api/photos/urls", post(get_photo_urls))
        .route("/api/photos/invalidate", post(invalidate))
}

/// Keep only paths the user owns. Rejects oversized requests outright.
fn owned_paths(user: &AuthUser, paths: Vec<String>) -> Result<Vec<String>> {
    if paths.len() > MAX_PATHS_PER_REQUEST {
        return Err(AppError::BadRequest(format!(
            "At most {} paths per request",
            MAX_PATHS_PER_REQUEST
        )));
    }

    let requested = paths.len();
    let owned: Vec<String> = paths
        .into_iter()
        .filter(|p| p.len() <= MAX_PATH_LENGTH && is_owned_by(p, user.user_id))
        .collect();

    if owned.len() < requested {
        tracing::warn!(
            user_id = user.user_id,
            dropped = requested - owned.len(),
            "Dropped photo paths outside the user's folder"
        );
    }

    Ok(owned)
}

// ─── Single URL ──────────────────────────────────────────────

#[derive(Deserialize)]
struct SignedUrlQuery {
    path: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SignedUrlResponse {
    pub url: String,
}

/// Signed URL for one path. Upstream failures surface as 502.
async fn get_signed_url(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<SignedUrlQuery>,
) -> Result<Json<SignedUrlResponse>> {
    if params.path.len() > MAX_PATH_LENGTH || !is_owned_by(&params.path, user.user_id) {
        return Err(AppError::Forbidden("Photo path not accessible".to_string()));
    }

    let url = state.photo_urls.get_signed_url(&params.path).await?;
    Ok(Json(SignedUrlResponse { url }))
}

// ─── Batch URLs ──────────────────────────────────────────────

#[derive(Deserialize)]
struct PathsRequest {
    paths: Vec<String>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SignedUrlsResponse {
    /// `null` for paths that could not be signed
    pub urls: HashMap<String, Option<String>>,
}

/// Signed URLs for many paths (also used by clients to refresh stale URLs).
async fn get_signed_urls(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<PathsRequest>,
) -> Result<Json<SignedUrlsResponse>> {
    let paths = owned_paths(&user, body.paths)?;
    if paths.is_empty() {
        return Err(AppError::Forbidden("No valid file paths found".to_string()));
    }

    let urls = state.photo_urls.get_signed_urls(&paths).await;
    Ok(Json(SignedUrlsResponse { urls }))
}

// ─── Photo records ───────────────────────────────────────────

#[derive(Deserialize)]
struct PhotosRequest {
    photos: Vec<PhotoPaths>,
}

/// Attach signed image and thumbnail URLs to photo records.
///
/// Storage paths are not echoed back.
async fn get_photo_urls(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<PhotosRequest>,
) -> Result<Json<Vec<PhotoUrls>>> {
    let all_paths: Vec<String> = body
        .photos
        .iter()
        .flat_map(|p| p.paths().map(str::to_string))
        .collect();
    let paths = owned_paths(&user, all_paths)?;

    tracing::debug!(
        user_id = user.user_id,
        photos = body.photos.len(),
        paths = paths.len(),
        "Signing photo URLs"
    );

    let urls = state.photo_urls.get_signed_urls(&paths).await;
    let lookup = |path: &str| urls.get(path).cloned().flatten();

    let photos = body
        .photos
        .iter()
        .map(|photo| PhotoUrls {
            id: photo.id,
            image_url: lookup(&photo.image_path),
            thumbnail_url: lookup(&photo.thumbnail_path),
        })
        .collect();

    Ok(Json(photos))
}

// ─── Invalidation ────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct InvalidateResponse {
    pub invalidated: usize,
}

/// Drop cached URLs for paths whose files were deleted or replaced.
async fn invalidate(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<PathsRequest>,
) -> Result<Json<InvalidateResponse>> {
    let paths = owned_paths(&user, body.paths)?;
    state.photo_urls.invalidate_many(&paths);

    Ok(Json(InvalidateResponse {
        invalidated: paths.len(),
    }))
}
