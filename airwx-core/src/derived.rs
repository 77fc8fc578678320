//! Unit conversions and derived aviation metrics.
//!
//! Everything here is pure: no clock, no I/O. Inputs are in the canonical
//! units of [`WeatherRecord`](crate::model::WeatherRecord) unless a function
//! name says otherwise.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use crate::model::FlightCategory;

const MB_PER_INHG: f64 = 33.8639;
const KT_PER_MS: f64 = 1.943844;
const KT_PER_MPH: f64 = 0.868976;
const MM_PER_IN: f64 = 25.4;

// Magnus coefficients
const MAGNUS_A: f64 = 17.67;
const MAGNUS_B: f64 = 243.5;

const STANDARD_PRESSURE_INHG: f64 = 29.92;

pub fn f_to_c(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

pub fn c_to_f(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

pub fn mb_to_inhg(mb: f64) -> f64 {
    mb / MB_PER_INHG
}

pub fn mm_to_in(mm: f64) -> f64 {
    mm / MM_PER_IN
}

/// Metres per second to whole knots.
pub fn ms_to_kt(ms: f64) -> i32 {
    (ms * KT_PER_MS).round() as i32
}

/// Statute miles per hour to whole knots.
pub fn mph_to_kt(mph: f64) -> i32 {
    (mph * KT_PER_MPH).round() as i32
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Dewpoint (°C) from temperature (°C) and relative humidity (%), Magnus inversion.
pub fn dewpoint(temp_c: Option<f64>, humidity_pct: Option<f64>) -> Option<f64> {
    let (t, rh) = (temp_c?, humidity_pct?);
    if rh <= 0.0 {
        return None;
    }
    let gamma = (rh / 100.0).ln() + MAGNUS_A * t / (MAGNUS_B + t);
    Some(round_to(MAGNUS_B * gamma / (MAGNUS_A - gamma), 1))
}

/// Relative humidity (whole %) from temperature and dewpoint (°C).
pub fn humidity_from_dewpoint(temp_c: Option<f64>, dewpoint_c: Option<f64>) -> Option<i32> {
    let (t, td) = (temp_c?, dewpoint_c?);
    if t == td {
        return Some(100);
    }
    let vapor = (MAGNUS_A * td / (td + MAGNUS_B)).exp();
    let saturation = (MAGNUS_A * t / (t + MAGNUS_B)).exp();
    let humidity = (100.0 * vapor / saturation).round();
    Some(humidity.clamp(0.0, 100.0) as i32)
}

pub fn pressure_altitude(elevation_ft: f64, pressure_inhg: Option<f64>) -> Option<i32> {
    let p = pressure_inhg?;
    let altitude = elevation_ft + (STANDARD_PRESSURE_INHG - p) * 1000.0;
    Some(altitude.round() as i32)
}

/// Density altitude by the 120 ft per °F rule of thumb. Requires a pressure
/// reading even though only temperature enters the formula.
pub fn density_altitude(
    elevation_ft: f64,
    temp_c: Option<f64>,
    pressure_inhg: Option<f64>,
) -> Option<i32> {
    let t = temp_c?;
    pressure_inhg?;
    let standard_f = 59.0 - 0.003566 * elevation_ft;
    let altitude = elevation_ft + 120.0 * (c_to_f(t) - standard_f);
    Some(altitude.round() as i32)
}

/// Flight category from ceiling and visibility.
///
/// A missing input never forces a stricter category; both missing is undecidable.
/// IFR boundaries are inclusive (exactly 1000 ft or 3 sm is IFR); the LIFR and
/// MVFR limits are strict.
pub fn flight_category(
    ceiling_ft: Option<i32>,
    visibility_sm: Option<f64>,
) -> Option<FlightCategory> {
    if ceiling_ft.is_none() && visibility_sm.is_none() {
        return None;
    }
    let ceiling_below = |limit: i32| ceiling_ft.is_some_and(|c| c < limit);
    let ceiling_at_most = |limit: i32| ceiling_ft.is_some_and(|c| c <= limit);
    let vis_below = |limit: f64| visibility_sm.is_some_and(|v| v < limit);
    let vis_at_most = |limit: f64| visibility_sm.is_some_and(|v| v <= limit);

    let category = if ceiling_below(500) || vis_below(1.0) {
        FlightCategory::Lifr
    } else if ceiling_at_most(1000) || vis_at_most(3.0) {
        FlightCategory::Ifr
    } else if ceiling_below(3000) || vis_below(5.0) {
        FlightCategory::Mvfr
    } else {
        FlightCategory::Vfr
    };
    Some(category)
}

/// Gust spread over sustained wind; zero when either reading is missing or zero.
pub fn gust_factor(gust_kt: Option<i32>, wind_kt: Option<i32>) -> i32 {
    match (gust_kt, wind_kt) {
        (Some(g), Some(w)) if g != 0 && w != 0 => g - w,
        _ => 0,
    }
}

pub fn dewpoint_spread(temp_c: Option<f64>, dewpoint_c: Option<f64>) -> Option<f64> {
    Some(round_to(temp_c? - dewpoint_c?, 1))
}

/// Local sunrise and sunset (`HH:MM`) for the given date and location.
///
/// Either side is `None` when the sun does not cross the horizon that day.
pub fn sun_times(lat: f64, lon: f64, date: NaiveDate, tz: Tz) -> (Option<String>, Option<String>) {
    let Some((rise, set)) = solar_events(lat, lon, date) else {
        return (None, None);
    };
    let fmt = |t: DateTime<Utc>| t.with_timezone(&tz).format("%H:%M").to_string();
    (Some(fmt(rise)), Some(fmt(set)))
}

const J2000: f64 = 2_451_545.0;
const UNIX_EPOCH_JD: f64 = 2_440_587.5;

fn solar_events(lat: f64, lon: f64, date: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let midnight = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?);
    let jd_noon = midnight.timestamp() as f64 / 86_400.0 + UNIX_EPOCH_JD + 0.5;
    let n = (jd_noon - J2000).round();

    let mean_noon = n - lon / 360.0;
    let m = (357.5291 + 0.985_600_28 * mean_noon).rem_euclid(360.0);
    let m_rad = m.to_radians();
    let center = 1.9148 * m_rad.sin() + 0.02 * (2.0 * m_rad).sin() + 0.0003 * (3.0 * m_rad).sin();
    let ecliptic = (m + center + 180.0 + 102.9372)
        .rem_euclid(360.0)
        .to_radians();
    let transit = J2000 + mean_noon + 0.0053 * m_rad.sin() - 0.0069 * (2.0 * ecliptic).sin();

    let declination = (ecliptic.sin() * 23.4397_f64.to_radians().sin()).asin();
    let phi = lat.to_radians();
    let cos_hour_angle = ((-0.833_f64).to_radians().sin() - phi.sin() * declination.sin())
        / (phi.cos() * declination.cos());
    if !(-1.0..=1.0).contains(&cos_hour_angle) {
        return None;
    }
    let half_day = cos_hour_angle.acos().to_degrees() / 360.0;

    let to_utc = |jd: f64| {
        let millis = ((jd - UNIX_EPOCH_JD) * 86_400_000.0).round() as i64;
        DateTime::<Utc>::from_timestamp_millis(millis)
    };
    Some((to_utc(transit - half_day)?, to_utc(transit + half_day)?))
}
