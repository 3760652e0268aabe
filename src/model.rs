use crate::error::ApiError;
use crate::features::{FeatureRow, CATEGORICAL_COLUMNS, FEATURE_COLUMNS};
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::{fs, path::Path};

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// One-hot encoding of the categorical columns followed by the numeric
/// columns unchanged. Categories not seen during fitting encode to all zeros.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OneHotEncoder {
    categories: Vec<Vec<String>>,
}

impl OneHotEncoder {
    pub fn fit(rows: &[FeatureRow]) -> Self {
        let mut categories = vec![Vec::<String>::new(); CATEGORICAL_COLUMNS.len()];
        for row in rows {
            for (seen, value) in categories.iter_mut().zip(row.categorical_values()) {
                if !seen.iter().any(|s| s == value) {
                    seen.push(value.to_string());
                }
            }
        }
        for seen in categories.iter_mut() {
            seen.sort();
        }
        Self { categories }
    }

    pub fn width(&self) -> usize {
        self.categories.iter().map(Vec::len).sum::<usize>() + crate::features::NUMERIC_COLUMNS.len()
    }

    pub fn encode(&self, row: &FeatureRow) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.width());
        for (known, value) in self.categories.iter().zip(row.categorical_values()) {
            out.extend(known.iter().map(|k| if k == value { 1.0 } else { 0.0 }));
        }
        out.extend(row.numeric_values());
        out
    }

    fn matrix(&self, rows: &[FeatureRow]) -> DenseMatrix<f64> {
        let encoded: Vec<Vec<f64>> = rows.iter().map(|r| self.encode(r)).collect();
        DenseMatrix::from_2d_vec(&encoded)
    }
}

/// Random forest settings used by the trainer.
#[derive(Debug, Clone, Copy)]
pub struct ForestParams {
    pub n_trees: u16,
    pub max_depth: u16,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 300,
            max_depth: 15,
            seed: 42,
        }
    }
}

/// The persisted pipeline: encoder vocabulary, fitted forest and the column
/// list the rows were built with.
#[derive(Serialize, Deserialize)]
pub struct LapTimeModel {
    columns: Vec<String>,
    encoder: OneHotEncoder,
    forest: Forest,
}

impl LapTimeModel {
    pub fn fit(rows: &[FeatureRow], targets: &[f64], params: ForestParams) -> Result<Self> {
        if rows.is_empty() {
            bail!("cannot fit a model on an empty dataset");
        }
        if rows.len() != targets.len() {
            bail!(
                "row/target length mismatch: {} rows, {} targets",
                rows.len(),
                targets.len()
            );
        }

        let encoder = OneHotEncoder::fit(rows);
        let x = encoder.matrix(rows);
        let y = targets.to_vec();
        let forest_params = RandomForestRegressorParameters::default()
            .with_n_trees(params.n_trees.into())
            .with_max_depth(params.max_depth)
            .with_seed(params.seed);
        let forest = RandomForestRegressor::fit(&x, &y, forest_params)
            .map_err(|e| anyhow!("random forest fit failed: {e}"))?;

        Ok(Self {
            columns: FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            encoder,
            forest,
        })
    }

    pub fn predict_rows(&self, rows: &[FeatureRow]) -> Result<Vec<f64>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let x = self.encoder.matrix(rows);
        self.forest
            .predict(&x)
            .map_err(|e| anyhow!("random forest predict failed: {e}"))
    }

    pub fn predict(&self, row: &FeatureRow) -> Result<f64> {
        self.predict_rows(std::slice::from_ref(row))?
            .first()
            .copied()
            .context("model returned no prediction")
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn load(path: &Path) -> Result<Self> {
        let txt = fs::read_to_string(path)
            .with_context(|| format!("failed to read model artifact at {}", path.display()))?;
        let model: LapTimeModel = serde_json::from_str(&txt)
            .with_context(|| format!("failed to parse model artifact {}", path.display()))?;

        if model.columns != FEATURE_COLUMNS {
            bail!(
                "artifact was trained on columns {:?}, expected {:?}",
                model.columns,
                FEATURE_COLUMNS
            );
        }
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let txt = serde_json::to_string(self).context("failed to serialize model")?;
        fs::write(path, txt)
            .with_context(|| format!("failed to write model artifact to {}", path.display()))
    }
}

/// Serving-side wrapper. Holds no model when the artifact could not be loaded,
/// in which case every prediction reports the model as unavailable.
pub struct Predictor {
    model: Option<LapTimeModel>,
    artifact_name: String,
}

impl Predictor {
    pub fn new(model: Option<LapTimeModel>, artifact_path: &Path) -> Self {
        let artifact_name = artifact_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| artifact_path.display().to_string());
        Self {
            model,
            artifact_name,
        }
    }

    /// Loads the artifact, falling back to an unloaded predictor on any error.
    pub fn load(artifact_path: &Path) -> Self {
        match LapTimeModel::load(artifact_path) {
            Ok(model) => {
                tracing::info!(path = %artifact_path.display(), "model loaded");
                Self::new(Some(model), artifact_path)
            }
            Err(e) => {
                tracing::warn!(path = %artifact_path.display(), error = ?e, "could not load model");
                Self::new(None, artifact_path)
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    fn model(&self) -> Result<&LapTimeModel, ApiError> {
        self.model.as_ref().ok_or_else(|| {
            ApiError::ModelUnavailable(format!(
                "Model not loaded ({} missing or failed to load). Please run training.",
                self.artifact_name
            ))
        })
    }

    pub fn ensure_loaded(&self) -> Result<(), ApiError> {
        self.model().map(|_| ())
    }

    pub fn predict(&self, row: &FeatureRow) -> Result<f64, ApiError> {
        self.model()?
            .predict(row)
            .map_err(|e| ApiError::ModelUnavailable(e.to_string()))
    }
}
