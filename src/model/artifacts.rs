//! Reading the artifact directory produced by the training notebook.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StartupError;
use crate::features::ClipStats;

use super::{Model, Pipeline};

pub const PIPELINE_FILE: &str = "claim_approval_pipeline.json";
pub const METADATA_FILE: &str = "metadata.json";
pub const THRESHOLD_FILE: &str = "threshold.json";
pub const CLIP_STATS_FILE: &str = "clip_stats.json";

pub const DEFAULT_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Metadata {
    pub base_features: Vec<String>,
    #[serde(default)]
    pub num_cols: Vec<String>,
    #[serde(default)]
    pub cat_cols: Vec<String>,
    #[serde(default)]
    pub text_cols: Vec<String>,
    #[serde(default)]
    pub model_version: Option<String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, Value>,
    #[serde(default)]
    pub library_versions: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ThresholdFile {
    #[serde(default = "default_threshold")]
    threshold: f64,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StartupError> {
    let raw = fs::read(path).map_err(|source| StartupError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&raw).map_err(|source| StartupError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Clip stats only refine the amount features, so a broken file is logged
/// and skipped rather than failing startup.
fn read_clip_stats(path: &Path) -> Option<ClipStats> {
    if !path.exists() {
        return None;
    }
    match read_json::<ClipStats>(path) {
        Ok(stats) => Some(stats),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring clip stats");
            None
        }
    }
}

impl Model {
    /// Load and cross-check every artifact in `dir`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, StartupError> {
        let dir = dir.as_ref();
        let pipeline: Pipeline = read_json(&dir.join(PIPELINE_FILE))?;
        let metadata: Metadata = read_json(&dir.join(METADATA_FILE))?;
        let threshold = read_json::<ThresholdFile>(&dir.join(THRESHOLD_FILE))?.threshold;
        let clip_stats = read_clip_stats(&dir.join(CLIP_STATS_FILE));

        let model = Model::from_parts(pipeline, metadata, threshold, clip_stats, PathBuf::from(dir))?;

        tracing::info!(
            artifacts_dir = %dir.display(),
            features = model.schema.len(),
            required_fields = model.schema.required_fields().len(),
            encoded_width = model.pipeline.booster.n_features,
            trees = model.pipeline.booster.trees.len(),
            threshold = model.threshold,
            clip_stats = model.schema.has_clip_stats(),
            "model artifacts loaded"
        );

        Ok(model)
    }
}
