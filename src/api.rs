use crate::error::ApiError;
use crate::features::{build_row, PredictRequest};
use crate::jobs::{JobSnapshot, JobStore};
use crate::model::Predictor;
use crate::reference::{Circuit, CIRCUITS};
use crate::types::{HealthOut, PredictionOut, RunRequest, RunResponse};
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use std::{convert::Infallible, sync::Arc};

// ---------- Server state ----------
#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<Predictor>,
    pub jobs: Arc<JobStore>,
}

// ---------- Routes ----------
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/run", post(start_run))
        .route("/api/run/:run_id", get(run_status))
        .route("/api/run/:run_id/stream", get(run_stream))
        .route("/api/predict-laptime", post(predict_laptime))
        .route("/api/tracks", get(list_tracks))
        .route("/health", get(health))
        .with_state(state)
}

// ---------- Run handlers ----------
async fn start_run(State(state): State<AppState>, Json(req): Json<RunRequest>) -> Json<RunResponse> {
    tracing::debug!(mode = %req.mode, input_len = req.input.len(), "run requested");
    let run_id = state.jobs.submit(req.mode, req.params);
    Json(RunResponse { run_id })
}

async fn run_status(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<JobSnapshot>, ApiError> {
    let job = state.jobs.get(&run_id).ok_or(ApiError::NotFound)?;
    Ok(Json(job.snapshot()))
}

async fn run_stream(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    // 404 before any bytes are sent
    let events = state.jobs.stream(&run_id)?.map(|ev| {
        Ok::<_, Infallible>(Event::default().event(ev.kind()).data(ev.data()))
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

// ---------- Prediction ----------
fn predict(state: &AppState, body: Value) -> Result<PredictionOut, ApiError> {
    // Model check first, then input validation
    state.predictor.ensure_loaded()?;
    let req: PredictRequest =
        serde_json::from_value(body).map_err(|e| ApiError::Validation(e.to_string()))?;
    let row = build_row(&req)?;
    tracing::debug!(row = ?row, "prepared model input");

    // Run inference
    let pred = state.predictor.predict(&row)?;
    tracing::info!(track = %row.track, prediction = pred, "lap time predicted");
    Ok(PredictionOut {
        track: row.track,
        driver: req.driver,
        rounded_prediction: (pred * 100.0).round() / 100.0,
        model_prediction: pred,
    })
}

/// Errors are reported as `{"error": ...}` with a 200 status.
async fn predict_laptime(State(state): State<AppState>, Json(body): Json<Value>) -> Json<Value> {
    match predict(&state, body) {
        Ok(out) => Json(json!(out)),
        Err(e) => {
            tracing::warn!(error = %e, "prediction failed");
            Json(json!({ "error": e.to_string() }))
        }
    }
}

// ---------- Reference / health ----------
async fn list_tracks() -> Json<Vec<Circuit>> {
    Json(CIRCUITS.to_vec())
}

async fn health(State(state): State<AppState>) -> Json<HealthOut> {
    Json(HealthOut {
        status: "ok".to_string(),
        model_loaded: state.predictor.is_loaded(),
        runs: state.jobs.len(),
    })
}
