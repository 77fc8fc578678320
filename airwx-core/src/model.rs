use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cloud cover code of a reported sky layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CloudCover {
    Few,
    Sct,
    Bkn,
    Ovc,
    Ovx,
}

impl CloudCover {
    /// Parse a METAR cover code. CLR/SKC/NSC and unknown codes yield `None`.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "FEW" => Some(Self::Few),
            "SCT" => Some(Self::Sct),
            "BKN" => Some(Self::Bkn),
            "OVC" => Some(Self::Ovc),
            "OVX" => Some(Self::Ovx),
            _ => None,
        }
    }

    /// Layers of this cover constitute a ceiling.
    pub fn is_ceiling(&self) -> bool {
        matches!(self, Self::Bkn | Self::Ovc | Self::Ovx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FlightCategory {
    Vfr,
    Mvfr,
    Ifr,
    Lifr,
}

impl FlightCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vfr => "VFR",
            Self::Mvfr => "MVFR",
            Self::Ifr => "IFR",
            Self::Lifr => "LIFR",
        }
    }

    /// CSS class used by dashboards to colour the category badge.
    pub fn css_class(&self) -> &'static str {
        match self {
            Self::Vfr => "status-vfr",
            Self::Mvfr => "status-mvfr",
            Self::Ifr => "status-ifr",
            Self::Lifr => "status-lifr",
        }
    }
}

/// Normalized output of a single source parser.
///
/// Every field is explicitly optional; a missing reading is `None`, never zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub temperature_c: Option<f64>,
    pub dewpoint_c: Option<f64>,
    pub humidity_pct: Option<i32>,
    pub pressure_inhg: Option<f64>,
    pub wind_speed_kt: Option<i32>,
    pub wind_direction_deg: Option<i32>,
    pub gust_speed_kt: Option<i32>,
    pub precip_accum_in: Option<f64>,
    pub visibility_sm: Option<f64>,
    pub ceiling_ft: Option<i32>,
    pub cloud_cover: Option<CloudCover>,
    /// The upstream's own observation instant, when the payload carries one.
    pub observed_at: Option<DateTime<Utc>>,
}

impl Observation {
    /// At least one station reading is present. A payload carrying only a
    /// timestamp is no data.
    pub fn has_readings(&self) -> bool {
        self.temperature_c.is_some()
            || self.humidity_pct.is_some()
            || self.dewpoint_c.is_some()
            || self.pressure_inhg.is_some()
            || self.wind_speed_kt.is_some()
            || self.gust_speed_kt.is_some()
    }
}

/// One airport's fused weather snapshot for a single refresh cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    // Primary-source readings
    pub temperature_c: Option<f64>,
    pub temperature_f: Option<f64>,
    pub dewpoint_c: Option<f64>,
    pub dewpoint_f: Option<f64>,
    pub humidity_pct: Option<i32>,
    pub pressure_inhg: Option<f64>,
    pub wind_speed_kt: Option<i32>,
    pub wind_direction_deg: Option<i32>,
    pub gust_speed_kt: Option<i32>,
    pub precip_accum_in: Option<f64>,

    // METAR-source readings
    pub visibility_sm: Option<f64>,
    pub ceiling_ft: Option<i32>,
    pub cloud_cover: Option<CloudCover>,

    // Derived
    pub density_altitude_ft: Option<i32>,
    pub pressure_altitude_ft: Option<i32>,
    pub flight_category: Option<FlightCategory>,
    pub flight_category_class: Option<String>,
    pub gust_factor_kt: Option<i32>,
    pub dewpoint_spread_c: Option<f64>,
    pub sunrise: Option<String>,
    pub sunset: Option<String>,

    // Daily tracking
    pub temp_high_today_c: Option<f64>,
    pub temp_high_ts: Option<DateTime<Utc>>,
    pub temp_low_today_c: Option<f64>,
    pub temp_low_ts: Option<DateTime<Utc>>,
    pub peak_gust_today_kt: Option<i32>,
    pub peak_gust_time: Option<DateTime<Utc>>,

    // Provenance
    pub observation_time_primary: Option<DateTime<Utc>>,
    pub observation_time_metar: Option<DateTime<Utc>>,
    pub last_updated_primary: DateTime<Utc>,
    pub last_updated_metar: DateTime<Utc>,
}

impl WeatherRecord {
    /// An all-null record stamped with both provenance instants.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            temperature_c: None,
            temperature_f: None,
            dewpoint_c: None,
            dewpoint_f: None,
            humidity_pct: None,
            pressure_inhg: None,
            wind_speed_kt: None,
            wind_direction_deg: None,
            gust_speed_kt: None,
            precip_accum_in: None,
            visibility_sm: None,
            ceiling_ft: None,
            cloud_cover: None,
            density_altitude_ft: None,
            pressure_altitude_ft: None,
            flight_category: None,
            flight_category_class: None,
            gust_factor_kt: None,
            dewpoint_spread_c: None,
            sunrise: None,
            sunset: None,
            temp_high_today_c: None,
            temp_high_ts: None,
            temp_low_today_c: None,
            temp_low_ts: None,
            peak_gust_today_kt: None,
            peak_gust_time: None,
            observation_time_primary: None,
            observation_time_metar: None,
            last_updated_primary: now,
            last_updated_metar: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cloud_cover_codes() {
        assert_eq!(CloudCover::from_code("bkn"), Some(CloudCover::Bkn));
        assert_eq!(CloudCover::from_code("CLR"), None);
        assert!(CloudCover::Ovx.is_ceiling());
        assert!(!CloudCover::Sct.is_ceiling());
    }

    #[test]
    fn missing_fields_serialize_as_null() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let json = serde_json::to_value(WeatherRecord::empty(now)).unwrap();

        assert!(json.get("ceiling_ft").unwrap().is_null());
        assert!(json.get("peak_gust_time").unwrap().is_null());
        assert_eq!(json["last_updated_primary"], "2026-03-01T12:00:00Z");
    }

    #[test]
    fn flight_category_serializes_uppercase() {
        let json = serde_json::to_string(&FlightCategory::Mvfr).unwrap();
        assert_eq!(json, "\"MVFR\"");
        assert_eq!(FlightCategory::Lifr.css_class(), "status-lifr");
        assert_eq!(FlightCategory::Mvfr.as_str(), "MVFR");
    }

    #[test]
    fn timestamp_alone_has_no_readings() {
        let bare = Observation {
            observed_at: Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()),
            ..Observation::default()
        };
        assert!(!bare.has_readings());

        let gust_only = Observation {
            gust_speed_kt: Some(12),
            ..Observation::default()
        };
        assert!(gust_only.has_readings());
    }
}
