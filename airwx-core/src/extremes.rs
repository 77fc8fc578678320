//! Per-airport daily extremes: running high/low temperature and peak gust.
//!
//! Days are keyed by UTC calendar date, so an airport west of Greenwich sees
//! its "today" roll over at UTC midnight rather than local midnight.
//!
//! Each metric lives in one JSON document under the cache directory:
//!
//! ```text
//! { "2026-03-01": { "kspb": { "high": {"value": 20.0, "ts": "..."}, "low": {...} } } }
//! ```
//!
//! A process-wide lock per document serializes the read-modify-write so two
//! overlapping refreshes cannot lose each other's update.

use chrono::{DateTime, Days, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};
use tracing::warn;

use crate::SharedClock;

const TEMPERATURE_FILE: &str = "temp_extremes.json";
const GUST_FILE: &str = "peak_gusts.json";

/// Days of history kept besides today.
const RETAIN_DAYS: u64 = 2;

/// One extreme value and the instant it was observed. Entries written by
/// older versions may lack the instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredExtreme")]
pub struct Extreme {
    pub value: f64,
    pub ts: Option<DateTime<Utc>>,
}

/// On-disk shapes accepted for an [`Extreme`].
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredExtreme {
    Structured {
        value: f64,
        #[serde(default)]
        ts: Option<DateTime<Utc>>,
    },
    Bare(f64),
}

impl Extreme {
    fn observed(value: f64, at: DateTime<Utc>) -> Self {
        Self {
            value,
            ts: Some(at),
        }
    }
}

impl From<StoredExtreme> for Extreme {
    fn from(stored: StoredExtreme) -> Self {
        match stored {
            StoredExtreme::Structured { value, ts } => Extreme { value, ts },
            StoredExtreme::Bare(value) => Extreme { value, ts: None },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureExtremes {
    pub high: Extreme,
    pub low: Extreme,
}

impl TemperatureExtremes {
    /// Both sides seeded from one reading.
    fn single(e: Extreme) -> Self {
        Self { high: e, low: e }
    }
}

type Document<E> = BTreeMap<String, BTreeMap<String, E>>;

pub struct DailyExtremes {
    dir: PathBuf,
    clock: SharedClock,
    temperature_lock: Mutex<()>,
    gust_lock: Mutex<()>,
}

impl std::fmt::Debug for DailyExtremes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DailyExtremes")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl DailyExtremes {
    pub fn new(dir: impl Into<PathBuf>, clock: SharedClock) -> Self {
        Self {
            dir: dir.into(),
            clock,
            temperature_lock: Mutex::new(()),
            gust_lock: Mutex::new(()),
        }
    }

    /// Fold a temperature reading into today's high/low and return the result.
    ///
    /// High moves only on a strictly greater reading, low only on a strictly
    /// lower one; an unchanged extreme keeps its original instant.
    pub fn record_temperature(
        &self,
        airport: &str,
        value_c: f64,
        at: DateTime<Utc>,
    ) -> TemperatureExtremes {
        let _guard = self.temperature_lock.lock();
        let path = self.dir.join(TEMPERATURE_FILE);
        let mut doc: Document<TemperatureExtremes> = load(&path);
        let day = at.date_naive();
        let observed = Extreme::observed(value_c, at);

        let entry = doc
            .entry(date_key(day))
            .or_default()
            .entry(airport.to_string())
            .and_modify(|e| {
                if value_c > e.high.value {
                    e.high = observed;
                }
                if value_c < e.low.value {
                    e.low = observed;
                }
            })
            .or_insert(TemperatureExtremes::single(observed));
        let result = *entry;

        purge(&mut doc, day);
        store(&path, &doc);
        result
    }

    /// Today's extremes, widened to include `current_c`.
    ///
    /// Works without a prior `record_temperature` call in this process: the
    /// current reading alone seeds both sides.
    pub fn query_temperature(
        &self,
        airport: &str,
        current_c: Option<f64>,
    ) -> Option<TemperatureExtremes> {
        let now = self.clock.utc();
        let stored = {
            let _guard = self.temperature_lock.lock();
            let doc: Document<TemperatureExtremes> = load(&self.dir.join(TEMPERATURE_FILE));
            lookup(doc, now.date_naive(), airport)
        };

        let current = current_c.map(|value| Extreme::observed(value, now));
        match (stored, current) {
            (Some(mut ext), Some(cur)) => {
                if cur.value > ext.high.value {
                    ext.high = cur;
                }
                if cur.value < ext.low.value {
                    ext.low = cur;
                }
                Some(ext)
            }
            (Some(ext), None) => Some(ext),
            (None, Some(cur)) => Some(TemperatureExtremes::single(cur)),
            (None, None) => None,
        }
    }

    /// Fold a gust reading into today's peak and return the result.
    pub fn record_gust(&self, airport: &str, gust_kt: f64, at: DateTime<Utc>) -> Extreme {
        let _guard = self.gust_lock.lock();
        let path = self.dir.join(GUST_FILE);
        let mut doc: Document<Extreme> = load(&path);
        let day = at.date_naive();
        let observed = Extreme::observed(gust_kt, at);

        let entry = doc
            .entry(date_key(day))
            .or_default()
            .entry(airport.to_string())
            .and_modify(|e| {
                if gust_kt > e.value {
                    *e = observed;
                }
            })
            .or_insert(observed);
        let result = *entry;

        purge(&mut doc, day);
        store(&path, &doc);
        result
    }

    /// Today's peak gust, at least `current_kt`.
    pub fn query_gust(&self, airport: &str, current_kt: Option<f64>) -> Option<Extreme> {
        let now = self.clock.utc();
        let stored = {
            let _guard = self.gust_lock.lock();
            let doc: Document<Extreme> = load(&self.dir.join(GUST_FILE));
            lookup(doc, now.date_naive(), airport)
        };

        let current = current_kt.map(|value| Extreme::observed(value, now));
        match (stored, current) {
            (Some(peak), Some(cur)) if cur.value > peak.value => Some(cur),
            (Some(peak), _) => Some(peak),
            (None, cur) => cur,
        }
    }
}

fn date_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

fn lookup<E>(mut doc: Document<E>, day: NaiveDate, airport: &str) -> Option<E> {
    doc.remove(&date_key(day))?.remove(airport)
}

/// Drop days older than the retention window, and any key that is not a date.
fn purge<E>(doc: &mut Document<E>, today: NaiveDate) {
    let cutoff = today
        .checked_sub_days(Days::new(RETAIN_DAYS))
        .unwrap_or(today);
    doc.retain(|key, _| {
        NaiveDate::parse_from_str(key, "%Y-%m-%d").is_ok_and(|day| day >= cutoff)
    });
}

/// Read a document, treating a missing or unreadable file as empty.
fn load<E: DeserializeOwned>(path: &Path) -> Document<E> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Document::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read daily extremes");
            return Document::new();
        }
    };

    serde_json::from_str(&contents).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "Discarding unreadable daily extremes");
        Document::new()
    })
}

/// Persist a document. Failures are logged; the caller keeps its in-memory value.
fn store<E: Serialize>(path: &Path, doc: &Document<E>) {
    let result = serde_json::to_vec(doc)
        .map_err(io::Error::from)
        .and_then(|bytes| write_atomic(path, &bytes));

    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "Failed to persist daily extremes");
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}
