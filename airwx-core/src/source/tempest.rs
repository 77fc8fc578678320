//! WeatherFlow Tempest station observations.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::derived::{dewpoint, mb_to_inhg, mm_to_in, ms_to_kt};
use crate::model::Observation;

#[derive(Debug, Deserialize)]
struct TempestResponse {
    obs: Option<Vec<TempestObs>>,
}

#[derive(Debug, Deserialize)]
struct TempestObs {
    timestamp: Option<i64>,
    air_temperature: Option<f64>,
    relative_humidity: Option<f64>,
    dew_point: Option<f64>,
    sea_level_pressure: Option<f64>,
    station_pressure: Option<f64>,
    wind_avg: Option<f64>,
    wind_direction: Option<f64>,
    wind_gust: Option<f64>,
    precip_accum_local_day: Option<f64>,
}

/// Parse a station observation payload. `None` when the body is malformed,
/// carries no observations, or the observation has no readings.
pub fn parse(body: &str) -> Option<Observation> {
    let parsed: TempestResponse = serde_json::from_str(body).ok()?;
    let obs = parsed.obs?.into_iter().next()?;

    let humidity = obs.relative_humidity;
    let dewpoint_c = obs
        .dew_point
        .or_else(|| dewpoint(obs.air_temperature, humidity));
    let pressure_mb = obs.sea_level_pressure.or(obs.station_pressure);

    let observation = Observation {
        temperature_c: obs.air_temperature,
        dewpoint_c,
        humidity_pct: humidity.map(|h| h.round() as i32),
        pressure_inhg: pressure_mb.map(mb_to_inhg),
        wind_speed_kt: obs.wind_avg.map(ms_to_kt),
        wind_direction_deg: obs.wind_direction.map(|d| d.round() as i32),
        gust_speed_kt: obs.wind_gust.map(ms_to_kt),
        precip_accum_in: obs.precip_accum_local_day.map(mm_to_in),
        visibility_sm: None,
        ceiling_ft: None,
        cloud_cover: None,
        observed_at: obs
            .timestamp
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
    };
    observation.has_readings().then_some(observation)
}
