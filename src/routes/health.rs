use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthData {
    status: &'static str,
    artifacts_dir: String,
    pipeline_loaded: bool,
    features_expected: usize,
    threshold: f64,
    clip_stats_loaded: bool,
    loaded_at: DateTime<Utc>,
}

/// The router only exists once the model is loaded, so reaching this
/// handler means the artifacts are in memory.
pub async fn health(State(state): State<AppState>) -> Json<HealthData> {
    let model = &state.model;
    Json(HealthData {
        status: "ok",
        artifacts_dir: model.artifacts_dir().display().to_string(),
        pipeline_loaded: true,
        features_expected: model.features_expected(),
        threshold: model.threshold(),
        clip_stats_loaded: model.has_clip_stats(),
        loaded_at: model.loaded_at(),
    })
}
