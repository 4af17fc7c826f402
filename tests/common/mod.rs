// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Response;
use chrono::{DateTime, Utc};
use fitness_journal::config::Config;
use fitness_journal::error::AppError;
use fitness_journal::middleware::auth::Claims;
use fitness_journal::routes::create_router;
use fitness_journal::services::{
    InMemoryTimezoneStore, PhotoUrlService, PhotoUrlSettings, SignedUrlGenerator,
};
use fitness_journal::time_utils::Clock;
use fitness_journal::AppState;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Clock that only moves when told to.
#[allow(dead_code)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

#[allow(dead_code)]
impl ManualClock {
    pub fn at(rfc3339: &str) -> Arc<Self> {
        let now = DateTime::parse_from_rfc3339(rfc3339)
            .expect("valid RFC3339 instant")
            .with_timezone(&Utc);
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Signed-URL generator that counts calls and can be told to fail.
#[allow(dead_code)]
#[derive(Default)]
pub struct CountingGenerator {
    calls: AtomicUsize,
    failing: Mutex<HashSet<String>>,
    delay: Option<Duration>,
}

#[allow(dead_code)]
impl CountingGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Generator that takes `delay` per call, to widen race windows.
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_path(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_string());
    }
}

#[async_trait]
impl SignedUrlGenerator for CountingGenerator {
    async fn create_signed_url(&self, path: &str, ttl_secs: u64) -> Result<String, AppError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(path) {
            return Err(AppError::UpstreamUnavailable(format!("refused {path}")));
        }
        Ok(format!("https://signed.test/{path}?ttl={ttl_secs}&v={n}"))
    }
}

/// Build a cache over `generator` reading time from `clock`.
#[allow(dead_code)]
pub fn photo_service(
    generator: Arc<CountingGenerator>,
    clock: Arc<ManualClock>,
) -> PhotoUrlService {
    PhotoUrlService::with_clock(generator, PhotoUrlSettings::default(), clock)
}

/// Create a test app with offline fakes.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app(
    generator: Arc<CountingGenerator>,
    clock: Arc<ManualClock>,
) -> (axum::Router, Arc<AppState>) {
    let config = Config::test_default();
    let photo_urls = photo_service(generator, clock.clone());

    let state = Arc::new(AppState {
        config,
        photo_urls,
        timezones: Arc::new(InMemoryTimezoneStore::new()),
        clock,
    });

    (create_router(state.clone()), state)
}

/// Create a session token as the account service would.
#[allow(dead_code)]
pub fn create_test_jwt(user_id: u64, signing_key: &[u8]) -> String {
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        exp: now + 86400,
        iat: now,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )
    .expect("Failed to create JWT")
}

/// Read a response body as JSON.
#[allow(dead_code)]
pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}
