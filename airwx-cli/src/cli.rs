use airwx_core::{Config, SharedClock, WeatherService};
use clap::{Parser, Subcommand};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(
    name = "airwx",
    version,
    about = "Airport weather aggregation and caching"
)]
pub struct Cli {
    /// Config file; defaults to the platform config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve `/api/weather/{airport}` over HTTP.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: SocketAddr,
    },

    /// Run one refresh cycle, update the cache and print the record as JSON.
    Refresh {
        /// Airport identifier, e.g. "kspb".
        airport: String,
    },

    /// List configured airports.
    Airports,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config = match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };
        let clock: SharedClock = Arc::new(mockable::DefaultClock);
        let service = Arc::new(WeatherService::from_config(config, clock)?);

        match self.command {
            Command::Serve { bind } => crate::server::serve(service, bind).await?,
            Command::Refresh { airport } => {
                let (id, config) = service.resolve(&airport)?;
                let snapshot = service.refresh(&id, config).await?;
                println!("{}", serde_json::to_string_pretty(&snapshot.weather)?);
            }
            Command::Airports => {
                let config = service.config();
                if config.airports.is_empty() {
                    println!("No airports configured.");
                }
                for (id, airport) in &config.airports {
                    println!(
                        "{:<6} {:<8} {:>5}s  {}",
                        id.to_uppercase(),
                        airport.weather_source.kind(),
                        config.refresh_interval(airport).as_secs(),
                        airport.name
                    );
                }
            }
        }

        Ok(())
    }
}
