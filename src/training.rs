use crate::features::{CarInputs, FeatureRow};
use crate::model::{ForestParams, LapTimeModel};
use crate::reference::{driver_to_tier, Circuit, CIRCUITS};
use crate::telemetry::{Lap, Session, TelemetryProvider};
use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

pub const TRAINING_SESSION: &str = "R";
pub const TEST_FRACTION: f64 = 0.2;
pub const SPLIT_SEED: u64 = 42;

#[derive(Debug, Default, Clone)]
pub struct TrainingSet {
    pub rows: Vec<FeatureRow>,
    pub targets: Vec<f64>,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn extend(&mut self, other: TrainingSet) {
        self.rows.extend(other.rows);
        self.targets.extend(other.targets);
    }

    fn select(&self, idx: &[usize]) -> TrainingSet {
        TrainingSet {
            rows: idx.iter().map(|&i| self.rows[i].clone()).collect(),
            targets: idx.iter().map(|&i| self.targets[i]).collect(),
        }
    }
}

fn lap_row(circuit: &Circuit, session: &Session, lap: &Lap) -> Option<(FeatureRow, f64)> {
    let lap_time = lap.lap_time_s.filter(|t| *t > 0.0)?;
    let weather = session.nearest_weather(lap.time_s?)?;
    let compound = lap.compound.clone().filter(|c| !c.is_empty())?;
    let car = CarInputs {
        tyre_life: lap.tyre_life?,
        compound,
        speed_i1: lap.speed_i1?,
        speed_i2: lap.speed_i2?,
        speed_fl: lap.speed_fl?,
        air_temp: weather.air_temp?,
        track_temp: weather.track_temp?,
    };
    let row = FeatureRow::new(circuit, driver_to_tier(&lap.driver), car);
    Some((row, lap_time))
}

/// Feature rows for every complete, positively-timed lap of a session.
pub fn session_rows(circuit: &Circuit, session: &Session) -> TrainingSet {
    let mut set = TrainingSet::default();
    for (row, target) in session
        .laps
        .iter()
        .filter_map(|lap| lap_row(circuit, session, lap))
    {
        set.rows.push(row);
        set.targets.push(target);
    }
    set
}

/// Loads the race of `year` for every known circuit. Circuits that fail to
/// load are skipped.
pub async fn collect(provider: &dyn TelemetryProvider, year: i32) -> Result<TrainingSet> {
    let mut all = TrainingSet::default();
    for circuit in CIRCUITS.iter() {
        tracing::info!(track = circuit.name, year, "loading race");
        match provider
            .load_session(year, circuit.name, TRAINING_SESSION)
            .await
        {
            Ok(session) => {
                let set = session_rows(circuit, &session);
                tracing::info!(track = circuit.name, laps = set.len(), "race loaded");
                all.extend(set);
            }
            Err(e) => tracing::warn!(track = circuit.name, error = %e, "skipping track"),
        }
    }
    if all.is_empty() {
        bail!("No track data loaded. Training aborted.");
    }
    Ok(all)
}

/// Shuffled (train, test) index split; the test side gets `ceil(n * fraction)`.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut idx: Vec<usize> = (0..n).collect();
    idx.shuffle(&mut StdRng::seed_from_u64(seed));
    let n_test = ((n as f64) * test_fraction).ceil() as usize;
    let train = idx.split_off(n_test.min(n));
    (train, idx)
}

pub fn mean_absolute_error(truth: &[f64], pred: &[f64]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    truth
        .iter()
        .zip(pred)
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / truth.len() as f64
}

#[derive(Debug, Clone)]
pub struct TrainReport {
    pub total_rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub mae: f64,
}

/// Fits the lap-time pipeline on an 80/20 split and scores the held-out part.
pub fn train(data: &TrainingSet, params: ForestParams) -> Result<(LapTimeModel, TrainReport)> {
    if data.len() < 2 {
        bail!("need at least 2 laps to train, got {}", data.len());
    }
    let (train_idx, test_idx) = train_test_split(data.len(), TEST_FRACTION, SPLIT_SEED);
    let train_set = data.select(&train_idx);
    let test_set = data.select(&test_idx);

    tracing::info!(
        train = train_set.len(),
        test = test_set.len(),
        trees = params.n_trees,
        max_depth = params.max_depth,
        "training model"
    );
    let model = LapTimeModel::fit(&train_set.rows, &train_set.targets, params)?;
    let preds = model.predict_rows(&test_set.rows)?;
    let mae = mean_absolute_error(&test_set.targets, &preds);

    Ok((
        model,
        TrainReport {
            total_rows: data.len(),
            train_rows: train_set.len(),
            test_rows: test_set.len(),
            mae,
        },
    ))
}
