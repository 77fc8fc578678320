//! Stale-while-revalidate delivery of cached weather.
//!
//! Each request lands in one of three states:
//!
//! * `HIT`: the snapshot is younger than the airport's refresh interval and
//!   is served as is.
//! * `STALE`: the snapshot is older; it is served immediately with
//!   `stale: true` and the caller is told to revalidate once the response is
//!   on its way.
//! * `MISS`: nothing cached; the aggregator runs inline.
//!
//! Throttling happens before any of this, so a limited caller never causes an
//! upstream fetch.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    SharedClock,
    aggregator::Aggregator,
    config::{AirportConfig, Config},
    error::WeatherError,
    extremes::DailyExtremes,
    model::WeatherRecord,
    rate_limit::{KeyedRateLimiter, RateLimiter},
    snapshot::{CachedSnapshot, FileSnapshotStore, SnapshotStore},
    source::UpstreamClient,
    staleness::suppress_stale,
};

/// Upper bound on a background refresh, separate from the per-request timeouts.
pub const REVALIDATE_TIMEOUT: Duration = Duration::from_secs(30);

const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Stale,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Stale => "STALE",
            CacheStatus::Miss => "MISS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Ok,
    NotModified,
    BadRequest,
    NotFound,
    TooManyRequests,
    Unavailable,
}

impl DeliveryStatus {
    pub fn code(&self) -> u16 {
        match self {
            DeliveryStatus::Ok => 200,
            DeliveryStatus::NotModified => 304,
            DeliveryStatus::BadRequest => 400,
            DeliveryStatus::NotFound => 404,
            DeliveryStatus::TooManyRequests => 429,
            DeliveryStatus::Unavailable => 503,
        }
    }
}

/// Validators sent by the client.
#[derive(Debug, Clone, Default)]
pub struct Conditional {
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<DateTime<Utc>>,
}

impl Conditional {
    /// Build from raw header values. An unparseable date is ignored.
    pub fn from_headers(if_none_match: Option<&str>, if_modified_since: Option<&str>) -> Self {
        Self {
            if_none_match: if_none_match.map(str::to_string),
            if_modified_since: if_modified_since
                .and_then(|v| DateTime::parse_from_rfc2822(v.trim()).ok())
                .map(|d| d.with_timezone(&Utc)),
        }
    }

    fn matches(&self, etag: &str, last_modified: DateTime<Utc>) -> bool {
        if let Some(candidates) = &self.if_none_match {
            return candidates
                .split(',')
                .map(str::trim)
                .any(|c| c == "*" || c.trim_start_matches("W/") == etag);
        }
        self.if_modified_since
            .is_some_and(|since| last_modified.timestamp() <= since.timestamp())
    }
}

/// JSON body of every weather response.
#[derive(Debug, Serialize)]
pub struct WeatherEnvelope<'a> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weather: Option<&'a WeatherRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
}

impl<'a> WeatherEnvelope<'a> {
    fn failure(message: &'a str) -> Self {
        Self {
            success: false,
            weather: None,
            stale: None,
            error: Some(message),
        }
    }

    fn weather(weather: &'a WeatherRecord, stale: bool) -> Self {
        Self {
            success: true,
            weather: Some(weather),
            stale: stale.then_some(true),
            error: None,
        }
    }

    fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

/// Everything an HTTP layer needs to answer one weather request.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub status: DeliveryStatus,
    /// Serialized [`WeatherEnvelope`]; `None` for 304.
    pub body: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub max_age: Option<u64>,
    pub cache_status: Option<CacheStatus>,
    pub retry_after: Option<u64>,
    /// Set on STALE: the caller should start a background refresh after
    /// sending the response.
    pub revalidate: bool,
}

impl Delivery {
    fn new(status: DeliveryStatus) -> Self {
        Self {
            status,
            body: None,
            etag: None,
            last_modified: None,
            max_age: None,
            cache_status: None,
            retry_after: None,
            revalidate: false,
        }
    }

    fn error(status: DeliveryStatus, message: &str) -> Self {
        Self {
            body: WeatherEnvelope::failure(message).to_json(),
            ..Self::new(status)
        }
    }

    pub fn cache_control(&self) -> Option<String> {
        self.max_age.map(|age| format!("public, max-age={age}"))
    }

    pub fn last_modified_header(&self) -> Option<String> {
        self.last_modified.map(|t| t.format(HTTP_DATE).to_string())
    }
}

/// Request handler state: configuration, aggregator, snapshot store and
/// throttle, shared by reference for the life of the process.
pub struct WeatherService {
    config: Arc<Config>,
    aggregator: Aggregator,
    store: Arc<dyn SnapshotStore>,
    limiter: Arc<dyn RateLimiter>,
    clock: SharedClock,
}

impl WeatherService {
    pub fn new(
        config: Arc<Config>,
        aggregator: Aggregator,
        store: Arc<dyn SnapshotStore>,
        limiter: Arc<dyn RateLimiter>,
        clock: SharedClock,
    ) -> Self {
        Self {
            config,
            aggregator,
            store,
            limiter,
            clock,
        }
    }

    /// Production wiring: HTTP upstreams, file-backed snapshots and extremes
    /// under the configured cache directory, per-client throttle.
    pub fn from_config(config: Config, clock: SharedClock) -> anyhow::Result<Self> {
        let cache_dir = config.cache_dir()?;
        let upstream = UpstreamClient::new(config.endpoints.clone())
            .context("Failed to build HTTP client")?;
        let extremes = Arc::new(DailyExtremes::new(&cache_dir, Arc::clone(&clock)));
        let aggregator = Aggregator::new(upstream, extremes, Arc::clone(&clock));
        let rate = config.rate_limit.requests_per_minute;
        let limiter = Arc::new(KeyedRateLimiter::per_minute(rate));

        Ok(Self::new(
            Arc::new(config),
            aggregator,
            Arc::new(FileSnapshotStore::new(cache_dir)),
            limiter,
            clock,
        ))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn prune_rate_limits(&self) {
        self.limiter.prune();
    }

    /// Answer one weather request for `airport_id` from client `client_key`.
    pub async fn request(
        &self,
        airport_id: &str,
        client_key: &str,
        conditional: &Conditional,
    ) -> Delivery {
        if !self.limiter.allow(client_key) {
            debug!(client = client_key, "Rate limited");
            return Delivery {
                retry_after: Some(60),
                ..Delivery::error(DeliveryStatus::TooManyRequests, "Too many requests")
            };
        }

        let (id, airport) = match self.resolve(airport_id) {
            Ok(found) => found,
            Err(e) => {
                let status = match &e {
                    WeatherError::InvalidAirportId(_) => DeliveryStatus::BadRequest,
                    _ => DeliveryStatus::NotFound,
                };
                return Delivery::error(status, e.user_message());
            }
        };

        let cached = match self.store.read(&id).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(airport = %id, error = %e, "Unreadable weather snapshot; refreshing");
                None
            }
        };

        let now = self.clock.utc();
        let interval = self.config.refresh_interval(airport).as_secs();

        match cached {
            Some(snapshot) => {
                let age = (now - snapshot.stored_at).num_seconds().max(0) as u64;
                if age < interval {
                    debug!(airport = %id, age, "Cache hit");
                    let remaining = interval - age;
                    self.serve(snapshot, CacheStatus::Hit, remaining, conditional)
                } else {
                    debug!(airport = %id, age, "Serving stale weather");
                    self.serve_stale(snapshot)
                }
            }
            None => {
                debug!(airport = %id, "Cache miss");
                match self.refresh(&id, airport).await {
                    Ok(snapshot) => {
                        self.serve(snapshot, CacheStatus::Miss, interval, conditional)
                    }
                    Err(e) => Delivery::error(DeliveryStatus::Unavailable, e.user_message()),
                }
            }
        }
    }

    /// Background refresh after a STALE response. On failure the stale
    /// snapshot stays in place.
    pub async fn revalidate(&self, airport_id: &str) -> Result<(), WeatherError> {
        let (id, airport) = self.resolve(airport_id)?;
        match self.refresh(&id, airport).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(
                    airport = %id,
                    error = %e,
                    "Background refresh failed; keeping stale snapshot"
                );
                Err(e)
            }
        }
    }

    /// Run [`revalidate`](Self::revalidate) on its own task, bounded by
    /// [`REVALIDATE_TIMEOUT`]. The outcome is only logged.
    pub fn spawn_revalidation(self: &Arc<Self>, airport_id: &str) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let id = airport_id.to_string();
        tokio::spawn(async move {
            let refresh = service.revalidate(&id);
            let outcome = tokio::time::timeout(REVALIDATE_TIMEOUT, refresh).await;
            if outcome.is_err() {
                warn!(airport = %id, "Background refresh timed out");
            }
        })
    }

    /// Aggregate and persist a fresh snapshot. Persistence failures are logged;
    /// the fresh record is still returned.
    pub async fn refresh(
        &self,
        id: &str,
        airport: &AirportConfig,
    ) -> Result<CachedSnapshot, WeatherError> {
        let weather = self.aggregator.refresh(id, airport).await?;
        let snapshot = CachedSnapshot {
            stored_at: self.clock.utc(),
            weather,
        };

        if let Err(e) = self.store.write(id, &snapshot).await {
            warn!(airport = %id, error = %e, "Failed to persist weather snapshot");
        }
        Ok(snapshot)
    }

    /// Normalize and look up an airport identifier.
    pub fn resolve(&self, airport_id: &str) -> Result<(String, &AirportConfig), WeatherError> {
        let id = airport_id.trim().to_ascii_lowercase();
        let alphanumeric = id.chars().all(|c| c.is_ascii_alphanumeric());
        if !(3..=4).contains(&id.len()) || !alphanumeric {
            return Err(WeatherError::InvalidAirportId(airport_id.to_string()));
        }
        let airport = self
            .config
            .airport(&id)
            .ok_or_else(|| WeatherError::UnknownAirport(id.clone()))?;
        Ok((id, airport))
    }

    fn serve(
        &self,
        snapshot: CachedSnapshot,
        cache_status: CacheStatus,
        max_age: u64,
        conditional: &Conditional,
    ) -> Delivery {
        let weather = self.without_stale_fields(snapshot.weather);

        let headers = Delivery {
            last_modified: Some(snapshot.stored_at),
            max_age: Some(max_age),
            cache_status: Some(cache_status),
            ..Delivery::new(DeliveryStatus::Ok)
        };

        let record_json = match serde_json::to_vec(&weather) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize weather record");
                return Delivery::error(DeliveryStatus::Unavailable, "Weather data unavailable");
            }
        };
        let etag = format!("\"{}\"", hex::encode(Sha256::digest(&record_json)));

        if conditional.matches(&etag, snapshot.stored_at) {
            return Delivery {
                status: DeliveryStatus::NotModified,
                etag: Some(etag),
                ..headers
            };
        }

        Delivery {
            body: WeatherEnvelope::weather(&weather, false).to_json(),
            etag: Some(etag),
            ..headers
        }
    }

    fn serve_stale(&self, snapshot: CachedSnapshot) -> Delivery {
        let weather = self.without_stale_fields(snapshot.weather);

        Delivery {
            body: WeatherEnvelope::weather(&weather, true).to_json(),
            last_modified: Some(snapshot.stored_at),
            max_age: Some(0),
            cache_status: Some(CacheStatus::Stale),
            revalidate: true,
            ..Delivery::new(DeliveryStatus::Ok)
        }
    }

    fn without_stale_fields(&self, mut weather: WeatherRecord) -> WeatherRecord {
        let threshold = self.config.stale_threshold_seconds;
        suppress_stale(&mut weather, self.clock.utc(), threshold);
        weather
    }
}
