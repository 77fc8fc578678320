//! On-disk snapshot of each airport's last successful refresh.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    io,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};
use tokio::fs;

use crate::{error::WeatherError, model::WeatherRecord};

/// A persisted record and the instant it was written, which drives freshness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSnapshot {
    pub stored_at: DateTime<Utc>,
    pub weather: WeatherRecord,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredSnapshot {
    Wrapped(CachedSnapshot),
    Bare(WeatherRecord),
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn read(&self, airport: &str) -> Result<Option<CachedSnapshot>, WeatherError>;

    /// Replace the airport's snapshot. Readers see either the old or the new
    /// document, never a partial one.
    async fn write(&self, airport: &str, snapshot: &CachedSnapshot) -> Result<(), WeatherError>;
}

/// One JSON file per airport: `<dir>/weather_<airport>.json`.
#[derive(Debug)]
pub struct FileSnapshotStore {
    dir: PathBuf,
    tmp_counter: AtomicU64,
}

impl FileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            tmp_counter: AtomicU64::new(0),
        }
    }

    fn path(&self, airport: &str) -> PathBuf {
        self.dir.join(format!("weather_{airport}.json"))
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn read(&self, airport: &str) -> Result<Option<CachedSnapshot>, WeatherError> {
        let path = self.path(airport);
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&contents)? {
            StoredSnapshot::Wrapped(snapshot) => Ok(Some(snapshot)),
            StoredSnapshot::Bare(weather) => {
                // Written before snapshots carried their own instant.
                let modified = fs::metadata(&path).await?.modified()?;
                Ok(Some(CachedSnapshot {
                    stored_at: DateTime::<Utc>::from(modified),
                    weather,
                }))
            }
        }
    }

    async fn write(&self, airport: &str, snapshot: &CachedSnapshot) -> Result<(), WeatherError> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.path(airport);
        let seq = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let pid = std::process::id();
        let tmp = self.dir.join(format!(".weather_{airport}.{pid}.{seq}.tmp"));

        let bytes = serde_json::to_vec(snapshot)?;
        fs::write(&tmp, bytes).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot() -> CachedSnapshot {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut weather = WeatherRecord::empty(at);
        weather.temperature_c = Some(11.5);
        CachedSnapshot {
            stored_at: at,
            weather,
        }
    }

    #[tokio::test]
    async fn missing_snapshot_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        assert_eq!(store.read("kspb").await.unwrap(), None);
    }

    #[tokio::test]
    async fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("nested"));

        store.write("kspb", &snapshot()).await.unwrap();
        let read = store.read("kspb").await.unwrap();
        assert_eq!(read, Some(snapshot()));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn bare_record_uses_file_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let record = snapshot().weather;
        let bytes = serde_json::to_vec(&record).unwrap();
        let path = dir.path().join("weather_kspb.json");
        std::fs::write(path, bytes).unwrap();

        let store = FileSnapshotStore::new(dir.path());
        let read = store.read("kspb").await.unwrap().unwrap();
        assert_eq!(read.weather, record);
        assert!(Utc::now() - read.stored_at < chrono::Duration::minutes(1));
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather_kspb.json");
        std::fs::write(path, "{not json").unwrap();

        let store = FileSnapshotStore::new(dir.path());
        let read = store.read("kspb").await;
        assert!(matches!(read, Err(WeatherError::Persistence(_))));
    }
}
