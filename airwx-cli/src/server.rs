//! HTTP front end over [`WeatherService`].

use airwx_core::{Conditional, Delivery, WeatherService};
use axum::{
    Router,
    body::Body,
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing::info;

const PRUNE_INTERVAL: Duration = Duration::from_secs(300);

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<WeatherService>,
}

/// GET /api/weather/{airport}
async fn get_weather(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(airport): Path<String>,
    headers: HeaderMap,
) -> Response {
    let conditional = Conditional::from_headers(
        header_str(&headers, header::IF_NONE_MATCH),
        header_str(&headers, header::IF_MODIFIED_SINCE),
    );

    let client = peer.ip().to_string();
    let delivery = state.service.request(&airport, &client, &conditional).await;
    if delivery.revalidate {
        state.service.spawn_revalidation(&airport);
    }
    into_response(delivery)
}

fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// GET /health
async fn health_check() -> &'static str {
    "ok"
}

fn into_response(delivery: Delivery) -> Response {
    let status = StatusCode::from_u16(delivery.status.code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = axum::http::Response::builder().status(status);

    if delivery.body.is_some() {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
    }
    if let Some(etag) = &delivery.etag {
        builder = builder.header(header::ETAG, etag);
    }
    if let Some(last_modified) = delivery.last_modified_header() {
        builder = builder.header(header::LAST_MODIFIED, last_modified);
    }
    if let Some(cache_control) = delivery.cache_control() {
        builder = builder.header(header::CACHE_CONTROL, cache_control);
    }
    if let Some(cache_status) = delivery.cache_status {
        builder = builder.header("X-Cache-Status", cache_status.as_str());
    }
    if let Some(retry_after) = delivery.retry_after {
        builder = builder.header(header::RETRY_AFTER, retry_after.to_string());
    }

    builder
        .body(Body::from(delivery.body.unwrap_or_default()))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Create the HTTP router
pub fn create_router(service: Arc<WeatherService>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/weather/{airport}", get(get_weather))
        .with_state(AppState { service })
}

pub async fn serve(service: Arc<WeatherService>, bind: SocketAddr) -> anyhow::Result<()> {
    let pruner = Arc::clone(&service);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            ticker.tick().await;
            pruner.prune_rate_limits();
        }
    });

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(
        address = %listener.local_addr()?,
        airports = service.config().airports.len(),
        "Serving weather"
    );

    let app = create_router(service)
        .into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use airwx_core::{CacheStatus, Config, DeliveryStatus};
    use axum::extract::connect_info::MockConnectInfo;
    use chrono::{TimeZone, Utc};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEMPEST_BODY: &str = r#"{"station_id":42,"obs":[{
        "timestamp": 1772387940,
        "air_temperature": 15.0,
        "relative_humidity": 72,
        "sea_level_pressure": 1013.21
    }]}"#;

    const METAR_BODY: &str = r#"[{"icaoId": "KSPB", "visib": "10+", "clouds": []}]"#;

    fn delivery(status: DeliveryStatus) -> Delivery {
        Delivery {
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

    #[test]
    fn fresh_delivery_carries_cache_headers() {
        let response = into_response(Delivery {
            body: Some("{\"success\":true}".into()),
            etag: Some("\"abc\"".into()),
            last_modified: Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()),
            max_age: Some(45),
            cache_status: Some(CacheStatus::Hit),
            ..delivery(DeliveryStatus::Ok)
        });

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::ETAG], "\"abc\"");
        assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=45");
        assert_eq!(
            headers[header::LAST_MODIFIED],
            "Sun, 01 Mar 2026 12:00:00 GMT"
        );
        assert_eq!(headers["x-cache-status"], "HIT");
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn rate_limited_delivery_sets_retry_after() {
        let response = into_response(Delivery {
            retry_after: Some(60),
            ..delivery(DeliveryStatus::TooManyRequests)
        });
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "60");
    }

    #[test]
    fn not_modified_has_no_content_type() {
        let response = into_response(delivery(DeliveryStatus::NotModified));
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
    }

    async fn mount(server: &MockServer, route: &str, body: &str) {
        let response = ResponseTemplate::new(200).set_body_string(body);
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(response)
            .expect(2)
            .mount(server)
            .await;
    }

    /// Service whose snapshots go stale as soon as they are written.
    fn always_stale_service(server: &MockServer, cache: &std::path::Path) -> Arc<WeatherService> {
        let uri = server.uri();
        let toml = format!(
            r#"
            [endpoints]
            tempest = "{uri}"
            ambient = "{uri}"
            metar = "{uri}"

            [airports.kspb]
            elevation_ft = 58
            lat = 45.771
            lon = -122.862
            metar_station = "KSPB"
            refresh_seconds = 0

            [airports.kspb.weather_source]
            type = "tempest"
            station_id = "42"
            api_key = "TOKEN"
            "#
        );
        let mut config = Config::from_toml(&toml).unwrap();
        config.cache_dir = Some(cache.to_path_buf());

        let service = WeatherService::from_config(config, Arc::new(mockable::DefaultClock));
        Arc::new(service.unwrap())
    }

    async fn get_path(app: &Router, uri: &str) -> Response {
        let request = axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    async fn upstream_calls(server: &MockServer) -> usize {
        server.received_requests().await.map_or(0, |r| r.len())
    }

    #[tokio::test]
    async fn stale_response_triggers_background_refresh() {
        let server = MockServer::start().await;
        mount(&server, "/observations/station/42", TEMPEST_BODY).await;
        mount(&server, "/api/data/metar", METAR_BODY).await;

        let cache = tempfile::tempdir().unwrap();
        let service = always_stale_service(&server, cache.path());
        let peer = SocketAddr::from(([127, 0, 0, 1], 4000));
        let app = create_router(service).layer(MockConnectInfo(peer));

        let miss = get_path(&app, "/api/weather/kspb").await;
        assert_eq!(miss.status(), StatusCode::OK);
        assert_eq!(miss.headers()["x-cache-status"], "MISS");
        assert_eq!(upstream_calls(&server).await, 2);

        let stale = get_path(&app, "/api/weather/KSPB").await;
        assert_eq!(stale.status(), StatusCode::OK);
        assert_eq!(stale.headers()["x-cache-status"], "STALE");
        assert_eq!(stale.headers()[header::CACHE_CONTROL], "public, max-age=0");

        // One station and one METAR fetch per refresh.
        let refreshed = tokio::time::timeout(Duration::from_secs(5), async {
            while upstream_calls(&server).await < 4 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(refreshed.is_ok(), "no background refresh after STALE");
    }
}
