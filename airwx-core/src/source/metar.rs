//! Aviation Weather Center METAR reports (`/api/data/metar?format=json`).

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::config::AirportConfig;
use crate::derived::{humidity_from_dewpoint, mb_to_inhg};
use crate::model::{CloudCover, Observation};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetarReport {
    icao_id: Option<String>,
    obs_time: Option<i64>,
    temp: Option<f64>,
    dewp: Option<f64>,
    /// Degrees, or the string "VRB".
    wdir: Option<Value>,
    wspd: Option<f64>,
    wgst: Option<f64>,
    /// Number or token such as "10+", "1/2", "1 1/2".
    visib: Option<Value>,
    /// Altimeter setting in hPa.
    altim: Option<f64>,
    #[serde(default)]
    clouds: Vec<CloudLayer>,
}

#[derive(Debug, Deserialize)]
struct CloudLayer {
    cover: Option<String>,
    base: Option<i32>,
}

/// Parse a METAR report list.
///
/// The report for the airport's configured station is preferred; when no
/// report carries a matching `icaoId` the first one is used.
pub fn parse(body: &str, airport: Option<&AirportConfig>) -> Option<Observation> {
    let reports: Vec<MetarReport> = serde_json::from_str(body).ok()?;
    let station = airport.and_then(|a| a.metar_station.as_deref());

    let index = station
        .and_then(|s| {
            reports.iter().position(|r| {
                r.icao_id
                    .as_deref()
                    .is_some_and(|id| id.eq_ignore_ascii_case(s))
            })
        })
        .unwrap_or(0);
    let report = reports.into_iter().nth(index)?;

    let (ceiling_ft, cloud_cover) = sky_condition(&report.clouds);
    let wind_direction = report.wdir.as_ref().and_then(Value::as_f64);

    Some(Observation {
        temperature_c: report.temp,
        dewpoint_c: report.dewp,
        humidity_pct: humidity_from_dewpoint(report.temp, report.dewp),
        pressure_inhg: report.altim.map(mb_to_inhg),
        wind_speed_kt: report.wspd.map(|s| s.round() as i32),
        wind_direction_deg: wind_direction.map(|d| d.round() as i32),
        gust_speed_kt: report.wgst.map(|g| g.round() as i32),
        precip_accum_in: None,
        visibility_sm: report.visib.as_ref().and_then(parse_visibility),
        ceiling_ft,
        cloud_cover,
        observed_at: report
            .obs_time
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
    })
}

/// Ceiling is the base of the first BKN/OVC/OVX layer. Without one, ceiling is
/// unknown and the cover of the lowest reported layer is kept.
fn sky_condition(layers: &[CloudLayer]) -> (Option<i32>, Option<CloudCover>) {
    let covered: Vec<(CloudCover, Option<i32>)> = layers
        .iter()
        .filter_map(|l| {
            let cover = CloudCover::from_code(l.cover.as_deref()?)?;
            Some((cover, l.base))
        })
        .collect();

    if let Some((cover, base)) = covered.iter().find(|(cover, _)| cover.is_ceiling()) {
        return (*base, Some(*cover));
    }

    let lowest = covered
        .iter()
        .min_by_key(|(_, base)| base.unwrap_or(i32::MAX))
        .map(|(cover, _)| *cover);
    (None, lowest)
}

/// Statute-mile visibility from a JSON number or a METAR token.
fn parse_visibility(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_visibility_token(s),
        _ => None,
    }
}

fn parse_visibility_token(token: &str) -> Option<f64> {
    let cleaned = token
        .trim()
        .trim_end_matches("SM")
        .trim_end_matches('+')
        .trim_start_matches(['P', 'M']);

    let mut total = 0.0;
    let mut parts = 0;
    for part in cleaned.split_whitespace() {
        total += match part.split_once('/') {
            Some((num, den)) => {
                let den: f64 = den.parse().ok()?;
                if den == 0.0 {
                    return None;
                }
                num.parse::<f64>().ok()? / den
            }
            None => part.parse::<f64>().ok()?,
        };
        parts += 1;
    }

    if parts == 0 || parts > 2 { None } else { Some(total) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WeatherSource;

    fn airport(station: &str) -> AirportConfig {
        AirportConfig {
            name: String::new(),
            elevation_ft: 0.0,
            lat: 0.0,
            lon: 0.0,
            timezone: "UTC".into(),
            metar_station: Some(station.into()),
            refresh_seconds: None,
            weather_source: WeatherSource::Metar,
        }
    }

    #[test]
    fn parses_report_and_derives_humidity() {
        let body = r#"[{"icaoId":"KSPB","obsTime":1772366400,"temp":15,"dewp":15,
            "wdir":250,"wspd":8,"wgst":17,"visib":"10+","altim":1013.25,
            "clouds":[{"cover":"FEW","base":2500},{"cover":"BKN","base":5000},
                      {"cover":"OVC","base":8000}]}]"#;

        let obs = parse(body, Some(&airport("KSPB"))).unwrap();
        assert_eq!(obs.temperature_c, Some(15.0));
        assert_eq!(obs.humidity_pct, Some(100));
        assert_eq!(obs.wind_direction_deg, Some(250));
        assert_eq!(obs.gust_speed_kt, Some(17));
        assert_eq!(obs.visibility_sm, Some(10.0));
        assert_eq!(obs.ceiling_ft, Some(5000));
        assert_eq!(obs.cloud_cover, Some(CloudCover::Bkn));
        assert!((obs.pressure_inhg.unwrap() - 29.921).abs() < 0.001);
    }

    #[test]
    fn no_ceiling_layer_keeps_lowest_cover() {
        let body = r#"[{"visib":6,"clouds":[
            {"cover":"SCT","base":4000},{"cover":"FEW","base":1500}]}]"#;
        let obs = parse(body, None).unwrap();
        assert_eq!(obs.ceiling_ft, None);
        assert_eq!(obs.cloud_cover, Some(CloudCover::Few));
        assert_eq!(obs.visibility_sm, Some(6.0));
    }

    #[test]
    fn clear_sky_has_no_cover() {
        let obs = parse(r#"[{"clouds":[{"cover":"CLR"}]}]"#, None).unwrap();
        assert_eq!(obs.ceiling_ft, None);
        assert_eq!(obs.cloud_cover, None);
    }

    #[test]
    fn variable_wind_direction_is_null() {
        let obs = parse(r#"[{"wdir":"VRB","wspd":3}]"#, None).unwrap();
        assert_eq!(obs.wind_direction_deg, None);
        assert_eq!(obs.wind_speed_kt, Some(3));
        assert_eq!(obs.humidity_pct, None);
    }

    #[test]
    fn prefers_configured_station() {
        let body = r#"[{"icaoId":"KAAA","temp":1},{"icaoId":"KSPB","temp":2}]"#;
        let matched = parse(body, Some(&airport("kspb"))).unwrap();
        assert_eq!(matched.temperature_c, Some(2.0));
        let fallback = parse(body, Some(&airport("KZZZ"))).unwrap();
        assert_eq!(fallback.temperature_c, Some(1.0));
    }

    #[test]
    fn visibility_tokens() {
        assert_eq!(parse_visibility_token("1/2"), Some(0.5));
        assert_eq!(parse_visibility_token("1 1/2"), Some(1.5));
        assert_eq!(parse_visibility_token("3"), Some(3.0));
        assert_eq!(parse_visibility_token("P6SM"), Some(6.0));
        assert_eq!(parse_visibility_token("M1/4SM"), Some(0.25));
        assert_eq!(parse_visibility_token("1/0"), None);
        assert_eq!(parse_visibility_token(""), None);
        assert_eq!(parse_visibility_token("abc"), None);
    }

    #[test]
    fn malformed_or_empty_is_no_data() {
        assert_eq!(parse("[]", None), None);
        assert_eq!(parse("", None), None);
        assert_eq!(parse(r#"{"error":"bad"}"#, None), None);
    }
}
