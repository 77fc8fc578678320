use crate::source::SourceKind;

/// Failures surfaced by the aggregation and delivery layers.
///
/// Upstream transport problems never appear here directly: they collapse into
/// "no data" inside the source layer and only show up as `PrimaryUnavailable`
/// or `MetarUnavailable` when that source was mandatory.
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("Invalid airport identifier: {0:?}")]
    InvalidAirportId(String),

    #[error("Unknown airport: {0}")]
    UnknownAirport(String),

    #[error("Primary source {0} returned no usable data")]
    PrimaryUnavailable(SourceKind),

    #[error("METAR returned no usable data for station {0}")]
    MetarUnavailable(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WeatherError {
    /// Message safe to hand to clients. Never includes upstream text or credentials.
    pub fn user_message(&self) -> &'static str {
        match self {
            WeatherError::InvalidAirportId(_) => "Invalid airport identifier",
            WeatherError::UnknownAirport(_) => "Airport not found",
            WeatherError::PrimaryUnavailable(_)
            | WeatherError::MetarUnavailable(_)
            | WeatherError::Persistence(_)
            | WeatherError::Config(_) => "Weather data unavailable",
        }
    }
}

impl From<std::io::Error> for WeatherError {
    fn from(e: std::io::Error) -> Self {
        WeatherError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for WeatherError {
    fn from(e: serde_json::Error) -> Self {
        WeatherError::Persistence(e.to_string())
    }
}
