// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Signed photo URL cache.
//!
//! Signing a URL is a network round-trip to the storage service, and photo
//! grids ask for dozens at once. This service keeps each signed URL until it
//! gets close to expiry:
//! - A cached URL is reused while `now < expires_at - refresh_buffer`
//! - Past that point the next request signs a fresh URL
//! - Concurrent misses for one path share a single upstream call
//! - A background sweep drops entries that have fully expired

use crate::config::{Config, ConfigError};
use crate::error::AppError;
use crate::services::storage::SignedUrlGenerator;
use crate::time_utils::{Clock, SystemClock};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use futures_util::future::join_all;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Lifetime of a freshly signed URL (1 hour).
const DEFAULT_URL_EXPIRY_HOURS: i64 = 1;
/// Treat cached URLs as stale this long before they expire (10 minutes).
const DEFAULT_REFRESH_BUFFER_MINUTES: i64 = 10;
/// How often the background sweep runs (15 minutes).
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 15 * 60;

/// Cache timing parameters.
#[derive(Debug, Clone, Copy)]
pub struct PhotoUrlSettings {
    pub url_expiry: Duration,
    pub refresh_buffer: Duration,
    pub sweep_interval: std::time::Duration,
}

impl Default for PhotoUrlSettings {
    fn default() -> Self {
        Self {
            url_expiry: Duration::hours(DEFAULT_URL_EXPIRY_HOURS),
            refresh_buffer: Duration::minutes(DEFAULT_REFRESH_BUFFER_MINUTES),
            sweep_interval: std::time::Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl PhotoUrlSettings {
    /// Settings from validated config values.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let url_expiry = i64::try_from(config.url_expiry_hours)
            .ok()
            .and_then(Duration::try_hours)
            .ok_or_else(|| out_of_range("PHOTO_URL_EXPIRY_HOURS"))?;
        let refresh_buffer = i64::try_from(config.refresh_buffer_minutes)
            .ok()
            .and_then(Duration::try_minutes)
            .ok_or_else(|| out_of_range("PHOTO_URL_REFRESH_BUFFER_MINUTES"))?;
        let sweep_interval = config
            .sweep_interval_minutes
            .checked_mul(60)
            .map(std::time::Duration::from_secs)
            .ok_or_else(|| out_of_range("PHOTO_URL_SWEEP_INTERVAL_MINUTES"))?;

        Ok(Self {
            url_expiry,
            refresh_buffer,
            sweep_interval,
        })
    }

    /// Expiry in whole seconds, as passed to the signing API.
    fn ttl_secs(&self) -> u64 {
        self.url_expiry.num_seconds().max(1) as u64
    }
}

fn out_of_range(name: &str) -> ConfigError {
    ConfigError::Invalid(format!("{} is out of range", name))
}

/// A signed URL and the instant it stops working.
#[derive(Debug, Clone)]
pub struct CachedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

struct Inner {
    generator: Arc<dyn SignedUrlGenerator>,
    clock: Arc<dyn Clock>,
    settings: PhotoUrlSettings,
    cache: DashMap<String, CachedUrl>,
    /// Per-path signing slots; only one task signs a given path at a time.
    refresh_locks: DashMap<String, Arc<RefreshSlot>>,
}

/// Serializes signing of one path and records invalidations made meanwhile.
#[derive(Default)]
struct RefreshSlot {
    lock: Mutex<()>,
    /// Bumped by every invalidation of the path.
    generation: AtomicU64,
}

impl Inner {
    /// Cached URL for `path` if it is still outside the refresh buffer.
    fn fresh(&self, path: &str, now: DateTime<Utc>) -> Option<String> {
        let cached = self.cache.get(path)?;
        (now < cached.expires_at - self.settings.refresh_buffer).then(|| cached.url.clone())
    }

    fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.cache.retain(|_, cached| {
            let keep = now < cached.expires_at;
            if !keep {
                removed += 1;
            }
            keep
        });

        // Drop idle locks whose entry is gone.
        self.refresh_locks
            .retain(|path, slot| self.cache.contains_key(path) || Arc::strong_count(slot) > 1);

        removed
    }
}

struct Sweeper {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Signed-URL cache in front of a [`SignedUrlGenerator`].
///
/// Construct once at startup and share through `AppState`. The periodic sweep
/// only runs between [`start`](Self::start) and [`stop`](Self::stop).
pub struct PhotoUrlService {
    inner: Arc<Inner>,
    sweeper: std::sync::Mutex<Option<Sweeper>>,
}

impl PhotoUrlService {
    /// Create a cache using the system clock.
    pub fn new(generator: Arc<dyn SignedUrlGenerator>, settings: PhotoUrlSettings) -> Self {
        Self::with_clock(generator, settings, Arc::new(SystemClock))
    }

    /// Create a cache reading time from `clock`.
    pub fn with_clock(
        generator: Arc<dyn SignedUrlGenerator>,
        settings: PhotoUrlSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                generator,
                clock,
                settings,
                cache: DashMap::new(),
                refresh_locks: DashMap::new(),
            }),
            sweeper: std::sync::Mutex::new(None),
        }
    }

    pub fn settings(&self) -> PhotoUrlSettings {
        self.inner.settings
    }

    // ─── Lookups ─────────────────────────────────────────────────────────────

    /// Get a signed URL for `path`, signing a new one if the cached URL is
    /// missing or inside the refresh buffer.
    ///
    /// Upstream failures are returned as-is; nothing is retried.
    pub async fn get_signed_url(&self, path: &str) -> Result<String, AppError> {
        let inner = &self.inner;

        if let Some(url) = inner.fresh(path, inner.clock.now()) {
            tracing::trace!(path, "Signed URL cache hit");
            return Ok(url);
        }

        let slot = inner
            .refresh_locks
            .entry(path.to_string())
            .or_default()
            .clone();
        let _guard = slot.lock.lock().await;
        let generation = slot.generation.load(Ordering::Acquire);

        // Another task may have signed this path while we waited.
        let now = inner.clock.now();
        if let Some(url) = inner.fresh(path, now) {
            tracing::trace!(path, "Signed URL filled by concurrent request");
            return Ok(url);
        }

        let url = inner
            .generator
            .create_signed_url(path, inner.settings.ttl_secs())
            .await?;

        // The entry guard orders this check against `invalidate`'s removal.
        let entry = inner.cache.entry(path.to_string());
        if slot.generation.load(Ordering::Acquire) != generation {
            drop(entry);
            tracing::debug!(path, "Path invalidated during signing, not caching");
            return Ok(url);
        }

        let expires_at = now + inner.settings.url_expiry;
        entry.insert(CachedUrl {
            url: url.clone(),
            expires_at,
        });

        tracing::debug!(path, expires_at = %expires_at, "Signed URL cached");
        Ok(url)
    }

    /// Resolve many paths concurrently.
    ///
    /// A path whose signing fails maps to `None`; the rest of the batch is
    /// unaffected. Duplicate paths are looked up once.
    pub async fn get_signed_urls<S: AsRef<str>>(
        &self,
        paths: &[S],
    ) -> HashMap<String, Option<String>> {
        let unique: BTreeSet<&str> = paths.iter().map(|p| p.as_ref()).collect();

        let lookups = unique.into_iter().map(|path| async move {
            match self.get_signed_url(path).await {
                Ok(url) => (path.to_string(), Some(url)),
                Err(e) => {
                    tracing::warn!(path, error = %e, "Failed to sign photo URL");
                    (path.to_string(), None)
                }
            }
        });

        join_all(lookups).await.into_iter().collect()
    }

    // ─── Invalidation ────────────────────────────────────────────────────────

    /// Forget the cached URL for `path` (e.g. after the photo was deleted).
    ///
    /// A signing of `path` still in flight returns its URL to its own caller
    /// but does not cache it.
    pub fn invalidate(&self, path: &str) {
        // Bump first so a signing already in flight will not cache its URL.
        if let Some(slot) = self.inner.refresh_locks.get(path) {
            slot.generation.fetch_add(1, Ordering::AcqRel);
        }
        if self.inner.cache.remove(path).is_some() {
            tracing::debug!(path, "Signed URL invalidated");
        }
        self.inner
            .refresh_locks
            .remove_if(path, |_, slot| Arc::strong_count(slot) == 1);
    }

    /// Invalidate every path in `paths`.
    pub fn invalidate_many<S: AsRef<str>>(&self, paths: &[S]) {
        for path in paths {
            self.invalidate(path.as_ref());
        }
    }

    /// Remove every entry whose expiry has passed. Returns how many were removed.
    ///
    /// Unlike the read path this ignores the refresh buffer.
    pub fn sweep_expired(&self) -> usize {
        self.inner.sweep_expired()
    }

    /// The cached entry for `path`, regardless of freshness.
    pub fn peek(&self, path: &str) -> Option<CachedUrl> {
        self.inner.cache.get(path).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.inner.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.cache.is_empty()
    }

    // ─── Background sweep ────────────────────────────────────────────────────

    /// Start the periodic sweep. Calling this while it already runs does nothing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut sweeper = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if sweeper.is_some() {
            return;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let inner = self.inner.clone();
        let period = inner.settings.sweep_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = inner.sweep_expired();
                        tracing::debug!(removed, remaining = inner.cache.len(), "Swept expired photo URLs");
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        tracing::info!(interval_secs = period.as_secs(), "Photo URL sweep started");
        *sweeper = Some(Sweeper { shutdown, handle });
    }

    /// Stop the periodic sweep and wait for it to exit.
    pub async fn stop(&self) {
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(Sweeper { shutdown, handle }) = sweeper {
            if shutdown.send(true).is_err() {
                tracing::debug!("Photo URL sweep already exited");
            }
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Photo URL sweep task ended abnormally");
            }
            tracing::info!("Photo URL sweep stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
