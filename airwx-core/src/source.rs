use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{AirportConfig, Endpoints, WeatherSource};

pub mod ambient;
pub mod metar;
pub mod tempest;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Tempest,
    Ambient,
    Metar,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Tempest => "tempest",
            SourceKind::Ambient => "ambient",
            SourceKind::Metar => "metar",
        }
    }

    /// Station feeds are fetched alongside METAR; METAR-only airports make a single request.
    pub fn supports_concurrent_fetch(&self) -> bool {
        !matches!(self, SourceKind::Metar)
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP access to the upstream weather APIs.
///
/// Every failure (connect error, timeout, non-2xx, unreadable body) is logged
/// and reported as `None`; callers only ever see "no data".
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: Client,
    endpoints: Endpoints,
}

impl UpstreamClient {
    pub fn new(endpoints: Endpoints) -> reqwest::Result<Self> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, endpoints })
    }

    /// Raw body from the airport's station feed. `None` for METAR-typed sources.
    pub async fn fetch_primary(&self, airport: &AirportConfig) -> Option<String> {
        match &airport.weather_source {
            WeatherSource::Tempest { station_id, api_key } => {
                let url = format!(
                    "{}/observations/station/{}",
                    self.endpoints.tempest.trim_end_matches('/'),
                    station_id
                );
                let query = [("token", api_key.as_str())];
                self.get(SourceKind::Tempest, &url, &query).await
            }
            WeatherSource::Ambient { api_key, application_key, .. } => {
                let url = format!("{}/devices", self.endpoints.ambient.trim_end_matches('/'));
                let query = [
                    ("apiKey", api_key.as_str()),
                    ("applicationKey", application_key.as_str()),
                ];
                self.get(SourceKind::Ambient, &url, &query).await
            }
            WeatherSource::Metar => None,
        }
    }

    pub async fn fetch_metar(&self, station: &str) -> Option<String> {
        let base = self.endpoints.metar.trim_end_matches('/');
        let url = format!("{base}/api/data/metar");
        let query = [("ids", station), ("format", "json")];
        self.get(SourceKind::Metar, &url, &query).await
    }

    async fn get(&self, kind: SourceKind, url: &str, query: &[(&str, &str)]) -> Option<String> {
        // Request URLs carry API keys in the query string; errors are logged without them.
        let res = match self.http.get(url).query(query).send().await {
            Ok(res) => res,
            Err(e) => {
                let timeout = e.is_timeout();
                let e = e.without_url();
                warn!(source = %kind, timeout, "Upstream request failed: {e}");
                return None;
            }
        };

        let status = res.status();
        let body = match res.text().await {
            Ok(body) => body,
            Err(e) => {
                let e = e.without_url();
                warn!(source = %kind, "Failed to read upstream body: {e}");
                return None;
            }
        };

        if !status.is_success() {
            let body = truncate_body(&body);
            warn!(source = %kind, %status, %body, "Upstream returned an error status");
            return None;
        }

        debug!(source = %kind, bytes = body.len(), "Upstream response received");
        Some(body)
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}...", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tempest_airport() -> AirportConfig {
        AirportConfig {
            name: "Test".into(),
            elevation_ft: 100.0,
            lat: 45.0,
            lon: -122.0,
            timezone: "UTC".into(),
            metar_station: Some("KTST".into()),
            refresh_seconds: None,
            weather_source: WeatherSource::Tempest {
                station_id: "42".into(),
                api_key: "TOKEN".into(),
            },
        }
    }

    fn endpoints(uri: &str) -> Endpoints {
        Endpoints {
            tempest: uri.into(),
            ambient: uri.into(),
            metar: uri.into(),
        }
    }

    #[test]
    fn source_kind_displays_config_tag() {
        assert_eq!(SourceKind::Tempest.to_string(), "tempest");
        assert_eq!(SourceKind::Ambient.to_string(), "ambient");
        assert_eq!(SourceKind::Metar.as_str(), "metar");
    }

    #[test]
    fn only_station_feeds_fetch_concurrently() {
        assert!(SourceKind::Tempest.supports_concurrent_fetch());
        assert!(SourceKind::Ambient.supports_concurrent_fetch());
        assert!(!SourceKind::Metar.supports_concurrent_fetch());
    }

    #[tokio::test]
    async fn fetch_primary_sends_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/observations/station/42"))
            .and(query_param("token", "TOKEN"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"obs\":[]}"))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(endpoints(&server.uri())).unwrap();
        let body = client.fetch_primary(&tempest_airport()).await;
        assert_eq!(body.as_deref(), Some("{\"obs\":[]}"));
    }

    #[tokio::test]
    async fn non_success_status_is_no_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/data/metar"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(endpoints(&server.uri())).unwrap();
        assert_eq!(client.fetch_metar("KTST").await, None);
    }

    #[tokio::test]
    async fn unreachable_upstream_is_no_data() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let uri = format!("http://{addr}");
        let client = UpstreamClient::new(endpoints(&uri)).unwrap();
        assert_eq!(client.fetch_primary(&tempest_airport()).await, None);
        assert_eq!(client.fetch_metar("KTST").await, None);
    }

    #[tokio::test]
    async fn metar_source_has_no_primary_request() {
        let client = UpstreamClient::new(Endpoints::default()).unwrap();
        let mut airport = tempest_airport();
        airport.weather_source = WeatherSource::Metar;
        assert_eq!(client.fetch_primary(&airport).await, None);
    }
}
