// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::http::StatusCode;
use axum::response::IntoResponse;
use fitness_journal::error::AppError;

mod common;
use common::json_body;

#[test]
fn test_status_codes() {
    let cases = [
        (AppError::Unauthorized, StatusCode::UNAUTHORIZED),
        (AppError::InvalidToken, StatusCode::UNAUTHORIZED),
        (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN),
        (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
        (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
        (AppError::UpstreamUnavailable("x".into()), StatusCode::BAD_GATEWAY),
        (AppError::InvalidTimezone("x".into()), StatusCode::BAD_REQUEST),
        (AppError::MalformedDateInput("x".into()), StatusCode::BAD_REQUEST),
        (
            AppError::Internal(anyhow::anyhow!("boom")),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];

    for (err, expected) in cases {
        let label = err.to_string();
        assert_eq!(err.into_response().status(), expected, "{label}");
    }
}

#[tokio::test]
async fn test_invalid_timezone_body_names_zone() {
    let body = json_body(AppError::InvalidTimezone("Mars/Base".into()).into_response()).await;
    assert_eq!(body["error"], "invalid_timezone");
    assert_eq!(body["details"], "Mars/Base");
}

#[tokio::test]
async fn test_internal_error_hides_details() {
    let err = AppError::Internal(anyhow::anyhow!("connection string leaked"));
    let body = json_body(err.into_response()).await;
    assert_eq!(body["error"], "internal_error");
    assert!(body.get("details").is_none());
}
