use anyhow::{Context, Result, anyhow, bail};
use chrono_tz::Tz;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::source::SourceKind;

pub const DEFAULT_REFRESH_SECONDS: u64 = 60;

/// Age at which a source's readings are no longer trusted for flight decisions.
pub const DEFAULT_STALE_THRESHOLD_SECONDS: i64 = 3 * 60 * 60;

pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 60;

/// Credentials and type of an airport's live weather feed.
///
/// Example TOML:
/// [airports.kspb.weather_source]
/// type = "tempest"
/// station_id = "149918"
/// api_key = "..."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WeatherSource {
    Tempest {
        station_id: String,
        api_key: String,
    },
    Ambient {
        api_key: String,
        application_key: String,
        #[serde(default)]
        mac_address: Option<String>,
    },
    Metar,
}

impl WeatherSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            WeatherSource::Tempest { .. } => SourceKind::Tempest,
            WeatherSource::Ambient { .. } => SourceKind::Ambient,
            WeatherSource::Metar => SourceKind::Metar,
        }
    }
}

/// Static description of one airport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirportConfig {
    #[serde(default)]
    pub name: String,
    pub elevation_ft: f64,
    pub lat: f64,
    pub lon: f64,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub metar_station: Option<String>,
    /// Per-airport override of `default_refresh_seconds`.
    #[serde(default)]
    pub refresh_seconds: Option<u64>,
    pub weather_source: WeatherSource,
}

impl AirportConfig {
    /// Airport timezone, falling back to UTC when the name does not parse.
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or(Tz::UTC)
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
        }
    }
}

fn default_requests_per_minute() -> u32 {
    DEFAULT_REQUESTS_PER_MINUTE
}

/// Base URLs of the upstream APIs. Overridden in tests to point at mock servers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub tempest: String,
    pub ambient: String,
    pub metar: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            tempest: "https://swd.weatherflow.com/swd/rest".to_string(),
            ambient: "https://api.ambientweather.net/v1".to_string(),
            metar: "https://aviationweather.gov".to_string(),
        }
    }
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding weather snapshots and daily extremes. Defaults to the
    /// platform cache directory.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    #[serde(default = "default_refresh_seconds")]
    pub default_refresh_seconds: u64,

    #[serde(default = "default_stale_threshold_seconds")]
    pub stale_threshold_seconds: i64,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub endpoints: Endpoints,

    /// Example TOML:
    /// [airports.kspb]
    /// elevation_ft = 58
    /// lat = 45.77
    /// lon = -122.86
    #[serde(default)]
    pub airports: BTreeMap<String, AirportConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: None,
            default_refresh_seconds: DEFAULT_REFRESH_SECONDS,
            stale_threshold_seconds: DEFAULT_STALE_THRESHOLD_SECONDS,
            rate_limit: RateLimitConfig::default(),
            endpoints: Endpoints::default(),
            airports: BTreeMap::new(),
        }
    }
}

fn default_refresh_seconds() -> u64 {
    DEFAULT_REFRESH_SECONDS
}

fn default_stale_threshold_seconds() -> i64 {
    DEFAULT_STALE_THRESHOLD_SECONDS
}

impl Config {
    /// Load config from the default location, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        Self::load_from(&path)
    }

    /// Load config from an explicit path. A missing file yields the default.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let display = path.display();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {display}"))?;

        let cfg = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {display}"))?;

        Ok(cfg)
    }

    /// Parse and validate a TOML document. Airport keys are normalized to lowercase.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let mut cfg: Config = toml::from_str(contents)?;
        cfg.airports = std::mem::take(&mut cfg.airports)
            .into_iter()
            .map(|(id, airport)| (id.to_ascii_lowercase(), airport))
            .collect();
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        for (id, airport) in &self.airports {
            if airport.timezone.parse::<Tz>().is_err() {
                let tz = &airport.timezone;
                bail!("Airport '{id}' has an unknown timezone '{tz}'");
            }
            if !airport.elevation_ft.is_finite() {
                bail!("Airport '{id}' has a non-finite elevation");
            }
            let metar_fed = airport.weather_source.kind() == SourceKind::Metar;
            if metar_fed && airport.metar_station.is_none() {
                bail!("Airport '{id}' is METAR-fed but has no metar_station");
            }
        }
        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = Self::project_dirs()?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Resolved cache directory.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::project_dirs()?.cache_dir().to_path_buf()),
        }
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "airwx", "airwx")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }

    /// Case-insensitive airport lookup.
    pub fn airport(&self, id: &str) -> Option<&AirportConfig> {
        self.airports.get(&id.to_ascii_lowercase())
    }

    /// Refresh interval for an airport: its override if set, else the process default.
    pub fn refresh_interval(&self, airport: &AirportConfig) -> Duration {
        let seconds = airport
            .refresh_seconds
            .unwrap_or(self.default_refresh_seconds);
        Duration::from_secs(seconds)
    }
}
