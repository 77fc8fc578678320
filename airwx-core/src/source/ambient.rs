//! Ambient Weather device list (`/devices`), reading each device's `lastData`.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::derived::{dewpoint, f_to_c, mph_to_kt};
use crate::model::Observation;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AmbientDevice {
    mac_address: Option<String>,
    last_data: Option<AmbientData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AmbientData {
    dateutc: Option<i64>,
    tempf: Option<f64>,
    humidity: Option<f64>,
    dew_point: Option<f64>,
    baromrelin: Option<f64>,
    windspeedmph: Option<f64>,
    winddir: Option<f64>,
    windgustmph: Option<f64>,
    dailyrainin: Option<f64>,
}

/// Parse the device list. When `mac_address` is given the matching device is
/// used, otherwise the first one. A device whose `lastData` has no readings
/// is no data.
pub fn parse(body: &str, mac_address: Option<&str>) -> Option<Observation> {
    let devices: Vec<AmbientDevice> = serde_json::from_str(body).ok()?;

    let device = match mac_address {
        Some(mac) => devices.into_iter().find(|d| {
            d.mac_address
                .as_deref()
                .is_some_and(|m| m.eq_ignore_ascii_case(mac))
        })?,
        None => devices.into_iter().next()?,
    };
    let data = device.last_data?;

    let temperature_c = data.tempf.map(f_to_c);
    let dewpoint_c = data
        .dew_point
        .map(f_to_c)
        .or_else(|| dewpoint(temperature_c, data.humidity));

    let observation = Observation {
        temperature_c,
        dewpoint_c,
        humidity_pct: data.humidity.map(|h| h.round() as i32),
        pressure_inhg: data.baromrelin,
        wind_speed_kt: data.windspeedmph.map(mph_to_kt),
        wind_direction_deg: data.winddir.map(|d| d.round() as i32),
        gust_speed_kt: data.windgustmph.map(mph_to_kt),
        precip_accum_in: data.dailyrainin,
        visibility_sm: None,
        ceiling_ft: None,
        cloud_cover: None,
        observed_at: data
            .dateutc
            .and_then(DateTime::<Utc>::from_timestamp_millis),
    };
    observation.has_readings().then_some(observation)
}
