// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session authentication middleware.
//!
//! Sessions are issued by the account service; this API only verifies them.

use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "fj_token";

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
}

/// Authenticated user extracted from the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: u64,
}

/// The session cookie, else an `Authorization: Bearer` token.
fn session_token<'a>(jar: &'a CookieJar, headers: &'a HeaderMap) -> Option<&'a str> {
    jar.get(SESSION_COOKIE)
        .map(|cookie| cookie.value())
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)?
                .to_str()
                .ok()?
                .strip_prefix("Bearer ")
        })
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Check a session token's signature and expiry and return its user.
pub fn verify_session(token: &str, signing_key: &[u8]) -> Result<AuthUser, AppError> {
    let key = DecodingKey::from_secret(signing_key);
    let validation = Validation::new(Algorithm::HS256);

    let claims = decode::<Claims>(token, &key, &validation)
        .map_err(|e| {
            tracing::debug!(error = %e, "Rejected session token");
            AppError::InvalidToken
        })?
        .claims;

    let user_id = claims.sub.parse().map_err(|_| {
        tracing::debug!(sub = %claims.sub, "Session subject is not a user id");
        AppError::InvalidToken
    })?;

    Ok(AuthUser { user_id })
}

/// Middleware that requires a valid session.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = session_token(&jar, request.headers()).ok_or(AppError::Unauthorized)?;
    let user = verify_session(token, &state.config.jwt_signing_key)?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use axum_extra::extract::cookie::Cookie;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    const KEY: &[u8] = b"unit_test_signing_key_32_bytes!!";

    fn token(sub: &str, exp_offset: i64, key: &[u8]) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        let claims = Claims {
            sub: sub.to_string(),
            iat: now as usize,
            exp: (now + exp_offset) as usize,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(key),
        )
        .unwrap()
    }

    #[test]
    fn test_cookie_takes_precedence_over_header() {
        let jar = CookieJar::new().add(Cookie::new(SESSION_COOKIE, "from-cookie"));
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );

        assert_eq!(session_token(&jar, &headers), Some("from-cookie"));
        assert_eq!(
            session_token(&CookieJar::new(), &headers),
            Some("from-header")
        );
    }

    #[test]
    fn test_missing_or_malformed_header_has_no_token() {
        let jar = CookieJar::new();
        let mut headers = HeaderMap::new();
        assert_eq!(session_token(&jar, &headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(session_token(&jar, &headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(session_token(&jar, &headers), None);
    }

    #[test]
    fn test_verify_session() {
        let user = verify_session(&token("42", 3600, KEY), KEY).unwrap();
        assert_eq!(user, AuthUser { user_id: 42 });

        for bad in [
            token("42", -3600, KEY),
            token("42", 3600, b"another_key_entirely_32_bytes!!!"),
            token("athlete-42", 3600, KEY),
            "not.a.jwt".to_string(),
        ] {
            assert!(matches!(
                verify_session(&bad, KEY),
                Err(AppError::InvalidToken)
            ));
        }
    }
}
