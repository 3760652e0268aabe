use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};

/// Laps slower than this multiple of the session's fastest lap are not
/// considered representative.
pub const QUICKLAP_THRESHOLD: f64 = 1.07;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("no cached session for {circuit} {kind} ({year})")]
    SessionNotFound {
        year: i32,
        circuit: String,
        kind: String,
    },
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
    #[error("invalid session key '{0}'")]
    InvalidKey(String),
    #[error("session load timed out after {0}s")]
    Timeout(u64),
}

/// One timed lap. Times are seconds; `time_s` is the session clock at the end
/// of the lap and is what weather samples are matched against.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Lap {
    #[serde(rename = "Driver")]
    pub driver: String,
    #[serde(rename = "LapTime")]
    pub lap_time_s: Option<f64>,
    #[serde(rename = "Time")]
    pub time_s: Option<f64>,
    #[serde(rename = "TyreLife")]
    pub tyre_life: Option<f64>,
    #[serde(rename = "Compound")]
    pub compound: Option<String>,
    #[serde(rename = "SpeedI1")]
    pub speed_i1: Option<f64>,
    #[serde(rename = "SpeedI2")]
    pub speed_i2: Option<f64>,
    #[serde(rename = "SpeedFL")]
    pub speed_fl: Option<f64>,
    #[serde(rename = "PitInTime", default)]
    pub pit_in_s: Option<f64>,
    #[serde(rename = "PitOutTime", default)]
    pub pit_out_s: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WeatherSample {
    #[serde(rename = "Time")]
    pub time_s: f64,
    #[serde(rename = "AirTemp")]
    pub air_temp: Option<f64>,
    #[serde(rename = "TrackTemp")]
    pub track_temp: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    pub laps: Vec<Lap>,
    /// Sorted by `time_s`.
    pub weather: Vec<WeatherSample>,
}

impl Session {
    pub fn new(laps: Vec<Lap>, mut weather: Vec<WeatherSample>) -> Self {
        weather.sort_by(|a, b| a.time_s.total_cmp(&b.time_s));
        Self { laps, weather }
    }

    /// Representative laps: timed, not an in/out lap, and inside the
    /// threshold of the fastest such lap.
    pub fn quick_laps(&self) -> Vec<&Lap> {
        let timed: Vec<&Lap> = self
            .laps
            .iter()
            .filter(|l| l.lap_time_s.is_some_and(|t| t > 0.0))
            .filter(|l| l.pit_in_s.is_none() && l.pit_out_s.is_none())
            .collect();
        let Some(fastest) = timed
            .iter()
            .filter_map(|l| l.lap_time_s)
            .min_by(f64::total_cmp)
        else {
            return Vec::new();
        };
        let cutoff = fastest * QUICKLAP_THRESHOLD;
        timed
            .into_iter()
            .filter(|l| l.lap_time_s.is_some_and(|t| t < cutoff))
            .collect()
    }

    /// Weather sample closest in session time; ties go to the earlier one.
    pub fn nearest_weather(&self, time_s: f64) -> Option<&WeatherSample> {
        if self.weather.is_empty() {
            return None;
        }
        let idx = self.weather.partition_point(|w| w.time_s < time_s);
        let after = self.weather.get(idx);
        let before = idx.checked_sub(1).and_then(|i| self.weather.get(i));
        match (before, after) {
            (Some(b), Some(a)) => {
                if (time_s - b.time_s) <= (a.time_s - time_s) {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (Some(b), None) => Some(b),
            (None, a) => a,
        }
    }
}

/// Distinct drivers in first-seen order.
pub fn drivers(laps: &[&Lap]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for lap in laps {
        if !out.iter().any(|d| d == &lap.driver) {
            out.push(lap.driver.clone());
        }
    }
    out
}

/// Mean of the present values; `None` when nothing is present.
pub fn mean(values: impl IntoIterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Source of historical session data.
#[async_trait]
pub trait TelemetryProvider: Send + Sync {
    async fn load_session(
        &self,
        year: i32,
        circuit: &str,
        kind: &str,
    ) -> Result<Session, TelemetryError>;
}

/// Reads sessions exported to `{root}/{year}/{circuit}/{kind}/laps.csv` with an
/// optional sibling `weather.csv`.
#[derive(Debug, Clone)]
pub struct CsvCacheProvider {
    root: PathBuf,
}

impl CsvCacheProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory of one cached session. `circuit` and `kind` come from
    /// clients and must each be a single plain path component.
    pub fn session_dir(
        &self,
        year: i32,
        circuit: &str,
        kind: &str,
    ) -> Result<PathBuf, TelemetryError> {
        Ok(self
            .root
            .join(year.to_string())
            .join(cache_component(circuit)?)
            .join(cache_component(kind)?))
    }
}

fn cache_component(key: &str) -> Result<&str, TelemetryError> {
    let mut parts = Path::new(key).components();
    let single = matches!(
        (parts.next(), parts.next()),
        (Some(Component::Normal(_)), None)
    );
    if !single || key.contains(['/', '\\']) {
        return Err(TelemetryError::InvalidKey(key.to_string()));
    }
    Ok(key)
}

async fn read_optional(path: &Path) -> Result<Option<String>, TelemetryError> {
    match tokio::fs::read_to_string(path).await {
        Ok(txt) => Ok(Some(txt)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(TelemetryError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

fn parse_csv<T: serde::de::DeserializeOwned>(
    txt: &str,
    path: &Path,
) -> Result<Vec<T>, TelemetryError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(txt.as_bytes());
    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| TelemetryError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
}

#[async_trait]
impl TelemetryProvider for CsvCacheProvider {
    async fn load_session(
        &self,
        year: i32,
        circuit: &str,
        kind: &str,
    ) -> Result<Session, TelemetryError> {
        let dir = self.session_dir(year, circuit, kind)?;
        let laps_path = dir.join("laps.csv");
        let Some(laps_txt) = read_optional(&laps_path).await? else {
            return Err(TelemetryError::SessionNotFound {
                year,
                circuit: circuit.to_string(),
                kind: kind.to_string(),
            });
        };
        let laps: Vec<Lap> = parse_csv(&laps_txt, &laps_path)?;

        let weather_path = dir.join("weather.csv");
        let weather = match read_optional(&weather_path).await? {
            Some(txt) => parse_csv(&txt, &weather_path)?,
            None => Vec::new(),
        };
        tracing::debug!(
            circuit,
            kind,
            year,
            laps = laps.len(),
            weather = weather.len(),
            "session loaded from cache"
        );
        Ok(Session::new(laps, weather))
    }
}
