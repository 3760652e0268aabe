use crate::analytics::RunParams;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct RunRequest {
    /// Informational only.
    pub mode: String,
    /// Accepted for compatibility; not used by the analytics.
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub params: RunParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub run_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionOut {
    pub track: String,
    pub driver: Option<String>,
    pub rounded_prediction: f64,
    pub model_prediction: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthOut {
    pub status: String,
    pub model_loaded: bool,
    pub runs: usize,
}
