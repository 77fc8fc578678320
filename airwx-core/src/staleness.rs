//! Per-source staleness suppression.
//!
//! A reading that is too old to trust for a go/no-go decision is removed
//! rather than shown. Each source is judged on its own provenance instant, so
//! a stale METAR does not take fresh station data down with it. Daily extremes
//! and astronomical times are never touched.

use chrono::{DateTime, Duration, Utc};

use crate::derived::flight_category;
use crate::model::WeatherRecord;

fn is_stale(updated: DateTime<Utc>, now: DateTime<Utc>, threshold: Duration) -> bool {
    now - updated >= threshold
}

/// Null every field whose source is at least `threshold_seconds` old, then
/// recompute the flight category from what survives.
pub fn suppress_stale(record: &mut WeatherRecord, now: DateTime<Utc>, threshold_seconds: i64) {
    let threshold = Duration::seconds(threshold_seconds);

    if is_stale(record.last_updated_primary, now, threshold) {
        record.temperature_c = None;
        record.temperature_f = None;
        record.dewpoint_c = None;
        record.dewpoint_f = None;
        record.humidity_pct = None;
        record.pressure_inhg = None;
        record.wind_speed_kt = None;
        record.wind_direction_deg = None;
        record.gust_speed_kt = None;
        record.precip_accum_in = None;
        record.density_altitude_ft = None;
        record.pressure_altitude_ft = None;
        record.gust_factor_kt = None;
        record.dewpoint_spread_c = None;
    }

    if is_stale(record.last_updated_metar, now, threshold) {
        record.visibility_sm = None;
        record.ceiling_ft = None;
        record.cloud_cover = None;
    }

    record.flight_category = flight_category(record.ceiling_ft, record.visibility_sm);
    record.flight_category_class = record.flight_category.map(|c| c.css_class().to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_STALE_THRESHOLD_SECONDS;
    use crate::model::{CloudCover, FlightCategory};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).unwrap()
    }

    fn full_record(primary_age: i64, metar_age: i64) -> WeatherRecord {
        let mut r = WeatherRecord::empty(now());
        r.temperature_c = Some(15.0);
        r.dewpoint_c = Some(10.0);
        r.pressure_inhg = Some(29.92);
        r.wind_speed_kt = Some(8);
        r.gust_factor_kt = Some(0);
        r.density_altitude_ft = Some(120);
        r.visibility_sm = Some(2.0);
        r.ceiling_ft = Some(5000);
        r.cloud_cover = Some(CloudCover::Bkn);
        r.flight_category = Some(FlightCategory::Ifr);
        r.sunrise = Some("06:45".into());
        r.temp_high_today_c = Some(17.0);
        r.temp_low_today_c = Some(4.0);
        r.peak_gust_today_kt = Some(22);
        r.peak_gust_time = Some(now() - Duration::hours(9));
        r.last_updated_primary = now() - Duration::seconds(primary_age);
        r.last_updated_metar = now() - Duration::seconds(metar_age);
        r
    }

    #[test]
    fn default_threshold_is_three_hours() {
        assert_eq!(DEFAULT_STALE_THRESHOLD_SECONDS, 10_800);
    }

    #[test]
    fn age_equal_to_threshold_is_stale() {
        let mut r = full_record(10_800, 10_800);
        suppress_stale(&mut r, now(), 10_800);

        assert_eq!(r.temperature_c, None);
        assert_eq!(r.density_altitude_ft, None);
        assert_eq!(r.gust_factor_kt, None);
        assert_eq!(r.visibility_sm, None);
        assert_eq!(r.ceiling_ft, None);
        assert_eq!(r.cloud_cover, None);
        assert_eq!(r.flight_category, None);
        assert_eq!(r.flight_category_class, None);
    }

    #[test]
    fn age_just_under_threshold_is_kept() {
        let mut r = full_record(10_799, 10_799);
        suppress_stale(&mut r, now(), 10_800);

        assert_eq!(r.temperature_c, Some(15.0));
        assert_eq!(r.visibility_sm, Some(2.0));
        assert_eq!(r.flight_category, Some(FlightCategory::Ifr));
        assert_eq!(r.flight_category_class.as_deref(), Some("status-ifr"));
    }

    #[test]
    fn sources_are_judged_independently() {
        let mut r = full_record(60, 20_000);
        suppress_stale(&mut r, now(), 10_800);

        assert_eq!(r.temperature_c, Some(15.0));
        assert_eq!(r.pressure_inhg, Some(29.92));
        assert_eq!(r.ceiling_ft, None);
        assert_eq!(r.visibility_sm, None);
        assert_eq!(r.flight_category, None);
    }

    #[test]
    fn stale_visibility_recomputes_category_from_ceiling() {
        let mut r = full_record(60, 20_000);
        r.last_updated_metar = now();
        r.visibility_sm = None;
        r.ceiling_ft = Some(2500);
        suppress_stale(&mut r, now(), 10_800);
        assert_eq!(r.flight_category, Some(FlightCategory::Mvfr));
    }

    #[test]
    fn daily_tracking_is_never_nulled() {
        let mut r = full_record(1_000_000, 1_000_000);
        suppress_stale(&mut r, now(), 10_800);

        assert_eq!(r.temp_high_today_c, Some(17.0));
        assert_eq!(r.temp_low_today_c, Some(4.0));
        assert_eq!(r.peak_gust_today_kt, Some(22));
        assert!(r.peak_gust_time.is_some());
        assert_eq!(r.sunrise.as_deref(), Some("06:45"));
    }
}
