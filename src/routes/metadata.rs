use std::collections::BTreeMap;

use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::Value;

use crate::state::AppState;

#[derive(Serialize)]
pub struct MetadataResponse {
    model_version: Option<String>,
    pipeline_version: Option<String>,
    threshold: f64,
    metrics: BTreeMap<String, Value>,
    base_features: Vec<String>,
    num_cols: Vec<String>,
    cat_cols: Vec<String>,
    text_cols: Vec<String>,
    library_versions: BTreeMap<String, Value>,
}

pub async fn metadata(State(state): State<AppState>) -> Json<MetadataResponse> {
    let model = &state.model;
    let meta = model.metadata();
    Json(MetadataResponse {
        model_version: meta.model_version.clone(),
        pipeline_version: model.pipeline_version().map(str::to_string),
        threshold: model.threshold(),
        metrics: meta.metrics.clone(),
        base_features: meta.base_features.clone(),
        num_cols: meta.num_cols.clone(),
        cat_cols: meta.cat_cols.clone(),
        text_cols: meta.text_cols.clone(),
        library_versions: meta.library_versions.clone(),
    })
}
