use anyhow::{ensure, Context, Result};
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub model_path: PathBuf,
    pub cache_dir: PathBuf,
    pub poll_interval: Duration,
    /// No limit on telemetry loads unless set.
    pub analytics_timeout: Option<Duration>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            model_path: PathBuf::from("lap_predictor.json"),
            cache_dir: PathBuf::from("fastf1_cache"),
            poll_interval: crate::jobs::DEFAULT_POLL_INTERVAL,
            analytics_timeout: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset keys take their defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let d = Self::default();
        let poll_ms = parse_or(&get, "STREAM_POLL_MS", d.poll_interval.as_millis() as u64)?;
        // idle stream readers sleep this long; must be nonzero
        ensure!(poll_ms > 0, "invalid STREAM_POLL_MS: {poll_ms} (must be at least 1)");
        Ok(Self {
            host: get("BIND_HOST").unwrap_or(d.host),
            port: parse_or(&get, "PORT", d.port)?,
            model_path: get("MODEL_PATH").map(PathBuf::from).unwrap_or(d.model_path),
            cache_dir: get("FASTF1_CACHE").map(PathBuf::from).unwrap_or(d.cache_dir),
            poll_interval: Duration::from_millis(poll_ms),
            analytics_timeout: get("ANALYTICS_TIMEOUT_SECS")
                .map(|v| {
                    v.parse::<u64>()
                        .with_context(|| format!("invalid ANALYTICS_TIMEOUT_SECS: {v}"))
                })
                .transpose()?
                .map(Duration::from_secs),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(v) => v.parse::<T>().with_context(|| format!("invalid {key}: {v}")),
        None => Ok(default),
    }
}
