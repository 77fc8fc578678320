//! One weather refresh cycle for one airport.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    SharedClock,
    config::{AirportConfig, WeatherSource},
    derived,
    error::WeatherError,
    extremes::{DailyExtremes, Extreme, TemperatureExtremes},
    model::{Observation, WeatherRecord},
    source::{UpstreamClient, ambient, metar, tempest},
};

#[derive(Clone)]
pub struct Aggregator {
    upstream: UpstreamClient,
    extremes: Arc<DailyExtremes>,
    clock: SharedClock,
}

impl Aggregator {
    pub fn new(
        upstream: UpstreamClient,
        extremes: Arc<DailyExtremes>,
        clock: SharedClock,
    ) -> Self {
        Self {
            upstream,
            extremes,
            clock,
        }
    }

    /// Fetch, fuse and enrich a fresh record.
    ///
    /// Station-fed airports fetch the station and METAR concurrently. The
    /// station is mandatory: without it the refresh fails even if METAR
    /// answered. METAR only fills sky-condition fields the station left empty.
    pub async fn refresh(
        &self,
        id: &str,
        airport: &AirportConfig,
    ) -> Result<WeatherRecord, WeatherError> {
        let kind = airport.weather_source.kind();

        let (primary, metar) = if kind.supports_concurrent_fetch() {
            let metar_request = async {
                match airport.metar_station.as_deref() {
                    Some(station) => self.upstream.fetch_metar(station).await,
                    None => None,
                }
            };
            let (primary_body, metar_body) =
                tokio::join!(self.upstream.fetch_primary(airport), metar_request);

            let primary = primary_body
                .and_then(|body| parse_primary(&airport.weather_source, &body))
                .ok_or_else(|| {
                    warn!(airport = %id, source = %kind, "Primary source returned no usable data");
                    WeatherError::PrimaryUnavailable(kind)
                })?;

            let metar = metar_body.and_then(|body| metar::parse(&body, Some(airport)));
            if metar.is_none() && airport.metar_station.is_some() {
                warn!(airport = %id, "METAR unavailable; serving station data only");
            }
            (Some(primary), metar)
        } else {
            let station = airport.metar_station.as_deref().ok_or_else(|| {
                WeatherError::Config(format!("airport {id} has no METAR station"))
            })?;
            let report = self
                .upstream
                .fetch_metar(station)
                .await
                .and_then(|body| metar::parse(&body, Some(airport)))
                .ok_or_else(|| {
                    warn!(airport = %id, station, "METAR returned no usable data");
                    WeatherError::MetarUnavailable(station.to_string())
                })?;
            (None, Some(report))
        };

        let now = self.clock.utc();
        let mut record = fuse(primary, metar, now);
        enrich(&mut record, airport, now);

        let daily = self
            .daily_extremes(id, record.temperature_c, record.gust_speed_kt, now)
            .await;
        apply_daily(&mut record, daily);

        info!(
            airport = %id,
            source = %kind,
            category = record.flight_category.map_or("none", |c| c.as_str()),
            "Weather refreshed"
        );
        Ok(record)
    }

    async fn daily_extremes(
        &self,
        id: &str,
        temperature_c: Option<f64>,
        gust_kt: Option<i32>,
        now: DateTime<Utc>,
    ) -> DailySummary {
        let extremes = Arc::clone(&self.extremes);
        let airport = id.to_string();

        let task = tokio::task::spawn_blocking(move || {
            if let Some(t) = temperature_c {
                extremes.record_temperature(&airport, t, now);
            }
            if let Some(g) = gust_kt {
                extremes.record_gust(&airport, f64::from(g), now);
            }
            DailySummary {
                temperature: extremes.query_temperature(&airport, temperature_c),
                gust: extremes.query_gust(&airport, gust_kt.map(f64::from)),
            }
        });

        match task.await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(airport = %id, error = %e, "Daily extremes update failed");
                DailySummary::default()
            }
        }
    }
}

#[derive(Debug, Default)]
struct DailySummary {
    temperature: Option<TemperatureExtremes>,
    gust: Option<Extreme>,
}

fn parse_primary(source: &WeatherSource, body: &str) -> Option<Observation> {
    match source {
        WeatherSource::Tempest { .. } => tempest::parse(body),
        WeatherSource::Ambient { mac_address, .. } => ambient::parse(body, mac_address.as_deref()),
        WeatherSource::Metar => None,
    }
}

/// Build the record from the primary observation (if any) and METAR.
///
/// With a primary observation, METAR contributes only visibility, ceiling and
/// cloud cover, and only where the primary left them empty. Without one, the
/// whole record comes from METAR.
fn fuse(
    primary: Option<Observation>,
    metar: Option<Observation>,
    now: DateTime<Utc>,
) -> WeatherRecord {
    let mut record = WeatherRecord::empty(now);

    if let Some(obs) = primary.as_ref().or(metar.as_ref()) {
        record.temperature_c = obs.temperature_c;
        record.dewpoint_c = obs.dewpoint_c;
        record.humidity_pct = obs.humidity_pct;
        record.pressure_inhg = obs.pressure_inhg;
        record.wind_speed_kt = obs.wind_speed_kt;
        record.wind_direction_deg = obs.wind_direction_deg;
        record.gust_speed_kt = obs.gust_speed_kt;
        record.precip_accum_in = obs.precip_accum_in;
        record.visibility_sm = obs.visibility_sm;
        record.ceiling_ft = obs.ceiling_ft;
        record.cloud_cover = obs.cloud_cover;
    }

    if let (Some(_), Some(m)) = (&primary, &metar) {
        if record.visibility_sm.is_none() {
            record.visibility_sm = m.visibility_sm;
        }
        if record.ceiling_ft.is_none() {
            record.ceiling_ft = m.ceiling_ft;
        }
        if record.cloud_cover.is_none() {
            record.cloud_cover = m.cloud_cover;
        }
    }

    record.observation_time_primary = primary.as_ref().and_then(|p| p.observed_at);
    record.observation_time_metar = metar.as_ref().and_then(|m| m.observed_at);

    // Staleness is measured from our last successful fetch of each source. A
    // METAR that did not arrive gets the epoch so it can never read as fresh.
    record.last_updated_primary = now;
    record.last_updated_metar = if metar.is_some() {
        now
    } else {
        DateTime::<Utc>::default()
    };

    debug!(
        primary = primary.is_some(),
        metar = metar.is_some(),
        "Fused source observations"
    );
    record
}

fn enrich(record: &mut WeatherRecord, airport: &AirportConfig, now: DateTime<Utc>) {
    let elevation = airport.elevation_ft;
    let temperature = record.temperature_c;
    let to_f = |c: f64| derived::round_to(derived::c_to_f(c), 1);

    if record.dewpoint_c.is_none() {
        let humidity = record.humidity_pct.map(f64::from);
        record.dewpoint_c = derived::dewpoint(temperature, humidity);
    }
    if record.humidity_pct.is_none() {
        record.humidity_pct = derived::humidity_from_dewpoint(temperature, record.dewpoint_c);
    }

    record.temperature_f = temperature.map(to_f);
    record.dewpoint_f = record.dewpoint_c.map(to_f);
    record.pressure_altitude_ft = derived::pressure_altitude(elevation, record.pressure_inhg);
    record.density_altitude_ft =
        derived::density_altitude(elevation, temperature, record.pressure_inhg);
    record.flight_category = derived::flight_category(record.ceiling_ft, record.visibility_sm);
    record.flight_category_class = record.flight_category.map(|c| c.css_class().to_string());
    let gust_factor = derived::gust_factor(record.gust_speed_kt, record.wind_speed_kt);
    record.gust_factor_kt = Some(gust_factor);
    record.dewpoint_spread_c = derived::dewpoint_spread(temperature, record.dewpoint_c);

    let tz = airport.tz();
    let local_date = now.with_timezone(&tz).date_naive();
    let (sunrise, sunset) = derived::sun_times(airport.lat, airport.lon, local_date, tz);
    record.sunrise = sunrise;
    record.sunset = sunset;
}

fn apply_daily(record: &mut WeatherRecord, daily: DailySummary) {
    if let Some(t) = daily.temperature {
        record.temp_high_today_c = Some(t.high.value);
        record.temp_high_ts = t.high.ts;
        record.temp_low_today_c = Some(t.low.value);
        record.temp_low_ts = t.low.ts;
    }
    if let Some(g) = daily.gust {
        record.peak_gust_today_kt = Some(g.value.round() as i32);
        record.peak_gust_time = g.ts;
    }
}
