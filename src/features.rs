use crate::error::ApiError;
use crate::reference::{circuit_names, driver_to_tier, find_circuit, Circuit, DriverTier};
use serde::{Deserialize, Serialize};

/// Column order the model is trained and queried with.
pub const FEATURE_COLUMNS: [&str; 12] = [
    "Track",
    "TrackLength",
    "TrackType",
    "Baseline",
    "DriverTier",
    "TyreLife",
    "Compound",
    "SpeedI1",
    "SpeedI2",
    "SpeedFL",
    "AirTemp",
    "TrackTemp",
];

pub const CATEGORICAL_COLUMNS: [&str; 4] = ["Track", "TrackType", "DriverTier", "Compound"];

pub const NUMERIC_COLUMNS: [&str; 8] = [
    "TrackLength",
    "Baseline",
    "TyreLife",
    "SpeedI1",
    "SpeedI2",
    "SpeedFL",
    "AirTemp",
    "TrackTemp",
];

pub const DEFAULT_TYRE_LIFE: f64 = 10.0;
pub const DEFAULT_COMPOUND: &str = "SOFT";
pub const DEFAULT_SPEED_I1: f64 = 200.0;
pub const DEFAULT_SPEED_I2: f64 = 180.0;
pub const DEFAULT_SPEED_FL: f64 = 260.0;
pub const DEFAULT_AIR_TEMP: f64 = 22.0;
pub const DEFAULT_TRACK_TEMP: f64 = 30.0;

/// Per-lap inputs that do not come from the reference tables.
#[derive(Debug, Clone, PartialEq)]
pub struct CarInputs {
    pub tyre_life: f64,
    pub compound: String,
    pub speed_i1: f64,
    pub speed_i2: f64,
    pub speed_fl: f64,
    pub air_temp: f64,
    pub track_temp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FeatureRow {
    pub track: String,
    pub track_length: f64,
    pub track_type: String,
    pub baseline: f64,
    pub driver_tier: String,
    pub tyre_life: f64,
    pub compound: String,
    #[serde(rename = "SpeedI1")]
    pub speed_i1: f64,
    #[serde(rename = "SpeedI2")]
    pub speed_i2: f64,
    #[serde(rename = "SpeedFL")]
    pub speed_fl: f64,
    pub air_temp: f64,
    pub track_temp: f64,
}

impl FeatureRow {
    pub fn new(circuit: &Circuit, tier: DriverTier, car: CarInputs) -> Self {
        Self {
            track: circuit.name.to_string(),
            track_length: circuit.length_km,
            track_type: circuit.category.as_str().to_string(),
            baseline: circuit.baseline_lap_seconds,
            driver_tier: tier.as_str().to_string(),
            tyre_life: car.tyre_life,
            compound: car.compound,
            speed_i1: car.speed_i1,
            speed_i2: car.speed_i2,
            speed_fl: car.speed_fl,
            air_temp: car.air_temp,
            track_temp: car.track_temp,
        }
    }

    /// Values for `CATEGORICAL_COLUMNS`, same order.
    pub fn categorical_values(&self) -> [&str; 4] {
        [
            self.track.as_str(),
            self.track_type.as_str(),
            self.driver_tier.as_str(),
            self.compound.as_str(),
        ]
    }

    /// Values for `NUMERIC_COLUMNS`, same order.
    pub fn numeric_values(&self) -> [f64; 8] {
        [
            self.track_length,
            self.baseline,
            self.tyre_life,
            self.speed_i1,
            self.speed_i2,
            self.speed_fl,
            self.air_temp,
            self.track_temp,
        ]
    }
}

/// A numeric request field; clients send either JSON numbers or numeric strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumberField {
    Number(f64),
    Text(String),
}

impl NumberField {
    fn to_f64(&self, field: &str) -> Result<f64, ApiError> {
        match self {
            NumberField::Number(v) => Ok(*v),
            NumberField::Text(s) => s.trim().parse::<f64>().map_err(|_| {
                ApiError::Validation(format!("could not convert {field} to float: '{s}'"))
            }),
        }
    }
}

/// Body of `POST /api/predict-laptime`. Unrecognized keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PredictRequest {
    pub track: Option<String>,
    pub driver: Option<String>,
    pub tyre_life: Option<NumberField>,
    pub compound: Option<String>,
    #[serde(rename = "SpeedI1")]
    pub speed_i1: Option<NumberField>,
    #[serde(rename = "SpeedI2")]
    pub speed_i2: Option<NumberField>,
    #[serde(rename = "SpeedFL")]
    pub speed_fl: Option<NumberField>,
    pub air_temp: Option<NumberField>,
    pub track_temp: Option<NumberField>,
}

fn number_or(field: &Option<NumberField>, name: &str, default: f64) -> Result<f64, ApiError> {
    match field {
        Some(v) => v.to_f64(name),
        None => Ok(default),
    }
}

/// Builds the model input row for a prediction request, applying defaults for
/// every optional field. Only the track is validated.
pub fn build_row(req: &PredictRequest) -> Result<FeatureRow, ApiError> {
    let track = match req.track.as_deref() {
        Some(t) if !t.is_empty() => t,
        _ => return Err(ApiError::Validation("Track is required.".to_string())),
    };
    let circuit = find_circuit(track).ok_or_else(|| {
        ApiError::Validation(format!(
            "Unknown track '{}'. Supported tracks: {}",
            track,
            circuit_names().join(", ")
        ))
    })?;

    let car = CarInputs {
        tyre_life: number_or(&req.tyre_life, "TyreLife", DEFAULT_TYRE_LIFE)?,
        compound: req
            .compound
            .clone()
            .unwrap_or_else(|| DEFAULT_COMPOUND.to_string()),
        speed_i1: number_or(&req.speed_i1, "SpeedI1", DEFAULT_SPEED_I1)?,
        speed_i2: number_or(&req.speed_i2, "SpeedI2", DEFAULT_SPEED_I2)?,
        speed_fl: number_or(&req.speed_fl, "SpeedFL", DEFAULT_SPEED_FL)?,
        air_temp: number_or(&req.air_temp, "AirTemp", DEFAULT_AIR_TEMP)?,
        track_temp: number_or(&req.track_temp, "TrackTemp", DEFAULT_TRACK_TEMP)?,
    };
    let tier = driver_to_tier(req.driver.as_deref().unwrap_or(""));

    Ok(FeatureRow::new(circuit, tier, car))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(v: serde_json::Value) -> PredictRequest {
        serde_json::from_value(v).expect("valid request")
    }

    #[test]
    fn monaco_defaults() {
        let row = build_row(&request(json!({ "Track": "Monaco" }))).unwrap();
        assert_eq!(row.track, "Monaco");
        assert_eq!(row.track_length, 3.337);
        assert_eq!(row.track_type, "slow");
        assert_eq!(row.baseline, 72.0);
        assert_eq!(row.driver_tier, "C");
        assert_eq!(row.tyre_life, 10.0);
        assert_eq!(row.compound, "SOFT");
        assert_eq!(row.numeric_values()[3..], [200.0, 180.0, 260.0, 22.0, 30.0]);
    }

    #[test]
    fn unknown_track_lists_every_circuit() {
        let err = build_row(&request(json!({ "Track": "Atlantis" }))).unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("Unknown track 'Atlantis'. Supported tracks: Monaco, Bahrain"));
        for name in circuit_names() {
            assert!(msg.contains(name), "missing {name}");
        }
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn missing_track_is_rejected() {
        let err = build_row(&PredictRequest::default()).unwrap_err();
        assert_eq!(err.to_string(), "Track is required.");
        let err = build_row(&request(json!({ "Track": "" }))).unwrap_err();
        assert_eq!(err.to_string(), "Track is required.");
    }

    #[test]
    fn numeric_strings_are_coerced() {
        let row = build_row(&request(json!({
            "Track": "Spa",
            "Driver": "lec",
            "TyreLife": "4",
            "AirTemp": 18.5,
            "Compound": "HARD"
        })))
        .unwrap();
        assert_eq!(row.tyre_life, 4.0);
        assert_eq!(row.air_temp, 18.5);
        assert_eq!(row.driver_tier, "A");
        assert_eq!(row.compound, "HARD");

        let err = build_row(&request(json!({ "Track": "Spa", "SpeedI1": "fast" }))).unwrap_err();
        assert!(err.to_string().contains("SpeedI1"));
    }

    #[test]
    fn column_groups_cover_feature_columns_once() {
        let mut all: Vec<&str> = CATEGORICAL_COLUMNS.iter().chain(NUMERIC_COLUMNS.iter()).copied().collect();
        let mut expected = FEATURE_COLUMNS.to_vec();
        all.sort_unstable();
        expected.sort_unstable();
        assert_eq!(all, expected);
    }

    #[test]
    fn serialized_row_keys_follow_feature_columns() {
        let row = build_row(&request(json!({ "Track": "Monza" }))).unwrap();
        let value = serde_json::to_value(&row).unwrap();
        let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        let mut cols = FEATURE_COLUMNS.to_vec();
        keys.sort_unstable();
        cols.sort_unstable();
        assert_eq!(keys, cols);
    }
}
