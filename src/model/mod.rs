//! The loaded claim-approval model: artifact bundle plus scoring.

mod artifacts;
mod calibration;
mod preprocess;
mod trees;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use artifacts::Metadata;
use calibration::Calibration;
use preprocess::Preprocessor;
use trees::Booster;

use crate::claims::{ClaimRecord, Payload};
use crate::error::{ApiError, InferenceError, StartupError, ValidationError};
use crate::features::{ClipStats, FeatureRow, FeatureSchema};

/// Fitted preprocessing, tree ensemble and optional calibration.
#[derive(Debug, Clone, Deserialize)]
pub struct Pipeline {
    #[serde(default)]
    pub version: Option<String>,
    pub preprocessor: Preprocessor,
    pub booster: Booster,
    #[serde(default)]
    pub calibration: Option<Calibration>,
}

impl Pipeline {
    fn validate(&self, schema: &FeatureSchema) -> Result<(), String> {
        self.preprocessor.validate(schema)?;
        self.booster.validate()?;
        if let Some(calibration) = &self.calibration {
            calibration.validate()?;
        }
        let width = self.preprocessor.width();
        if width != self.booster.n_features {
            return Err(format!(
                "preprocessor produces {width} columns but the booster expects {}",
                self.booster.n_features
            ));
        }
        Ok(())
    }

    pub fn predict_proba(&self, row: &FeatureRow) -> Result<f64, InferenceError> {
        let encoded = self.preprocessor.encode(row)?;
        let margin = self.booster.margin(&encoded)?;
        let proba = match &self.calibration {
            Some(calibration) => calibration.probability(margin),
            None => trees::sigmoid(margin),
        };
        if !proba.is_finite() {
            return Err(InferenceError::NonFiniteScore(proba));
        }
        Ok(proba.clamp(0.0, 1.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub decision: u8,
    pub proba_approved: f64,
    pub threshold: f64,
}

fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

impl Prediction {
    /// The decision is taken on the reported (rounded) values so that
    /// `decision == 1` iff `proba_approved >= threshold` holds for clients.
    pub fn new(proba: f64, threshold: f64) -> Self {
        let proba_approved = round6(proba);
        let threshold = round6(threshold);
        Self {
            decision: u8::from(proba_approved >= threshold),
            proba_approved,
            threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scored {
    Single(Prediction),
    Batch(Vec<Prediction>),
}

/// Everything read from the artifact directory. Immutable once built.
#[derive(Debug)]
pub struct Model {
    pipeline: Pipeline,
    schema: FeatureSchema,
    metadata: Metadata,
    threshold: f64,
    artifacts_dir: PathBuf,
    loaded_at: DateTime<Utc>,
}

impl Model {
    pub fn from_parts(
        pipeline: Pipeline,
        metadata: Metadata,
        threshold: f64,
        clip_stats: Option<ClipStats>,
        artifacts_dir: PathBuf,
    ) -> Result<Self, StartupError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(StartupError::InvalidArtifact(format!(
                "threshold {threshold} is outside [0, 1]"
            )));
        }

        let schema = FeatureSchema::new(
            &metadata.base_features,
            &metadata.num_cols,
            &metadata.cat_cols,
            &metadata.text_cols,
            clip_stats,
        )
        .map_err(StartupError::InvalidArtifact)?;

        pipeline
            .validate(&schema)
            .map_err(StartupError::InvalidArtifact)?;

        Ok(Self {
            pipeline,
            schema,
            metadata,
            threshold,
            artifacts_dir,
            loaded_at: Utc::now(),
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn pipeline_version(&self) -> Option<&str> {
        self.pipeline.version.as_deref()
    }

    pub fn features_expected(&self) -> usize {
        self.schema.len()
    }

    pub fn has_clip_stats(&self) -> bool {
        self.schema.has_clip_stats()
    }

    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn predict(&self, claim: ClaimRecord, threshold: f64) -> Result<Prediction, ApiError> {
        let row = self.schema.row(claim)?;
        let proba = self.pipeline.predict_proba(&row)?;
        Ok(Prediction::new(proba, threshold))
    }

    /// Score a whole payload. `threshold` overrides the loaded one. Any
    /// failing row fails the request.
    pub fn score(&self, payload: Payload, threshold: Option<f64>) -> Result<Scored, ApiError> {
        let threshold = threshold.unwrap_or(self.threshold);
        match payload {
            Payload::Single(claim) => self.predict(claim, threshold).map(Scored::Single),
            Payload::Batch(claims) => claims
                .into_iter()
                .enumerate()
                .map(|(row, claim)| {
                    self.predict(claim, threshold).map_err(|e| match e {
                        ApiError::Validation(v) => ApiError::Validation(v.in_row(row)),
                        other => other,
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Scored::Batch),
        }
    }
}

/// Parse a `threshold` query override.
pub fn parse_threshold(raw: &str) -> Result<f64, ValidationError> {
    match raw.trim().parse::<f64>() {
        Ok(t) if (0.0..=1.0).contains(&t) => Ok(t),
        _ => Err(ValidationError::InvalidThreshold(raw.to_string())),
    }
}


#[cfg(test)]
mod tests {
    use super::fixture::*;
    use super::*;
    use serde_json::Value;

    fn claim(value: Value) -> ClaimRecord {
        let Value::Object(map) = value else {
            panic!("fixture must be an object")
        };
        ClaimRecord::from_object(map).unwrap()
    }

    #[test]
    fn pre_authorized_claim_is_approved() {
        let model = demo_model();
        let prediction = model.predict(claim(approved_claim()), 0.5).unwrap();
        assert_eq!(
            prediction,
            Prediction {
                decision: 1,
                proba_approved: 0.92,
                threshold: 0.5
            }
        );
    }

    #[test]
    fn under_billed_unauthorised_claim_is_rejected() {
        let model = demo_model();
        let prediction = model.predict(claim(rejected_claim()), 0.5).unwrap();
        assert_eq!(prediction.decision, 0);
        assert!(prediction.proba_approved < 0.5);
    }

    #[test]
    fn prediction_is_deterministic() {
        let model = demo_model();
        let first = model.predict(claim(approved_claim()), 0.5).unwrap();
        for _ in 0..10 {
            assert_eq!(model.predict(claim(approved_claim()), 0.5).unwrap(), first);
        }
    }

    #[test]
    fn decision_tracks_threshold() {
        let model = demo_model();
        let strict = model.predict(claim(approved_claim()), 0.95).unwrap();
        assert_eq!(strict.decision, 0);
        assert_eq!(strict.threshold, 0.95);

        let at_boundary = model.predict(claim(approved_claim()), 0.92).unwrap();
        assert_eq!(at_boundary.decision, 1);
    }

    #[test]
    fn missing_field_never_yields_a_prediction() {
        let model = demo_model();
        let mut incomplete = approved_claim();
        incomplete.as_object_mut().unwrap().remove("PRE-AUTHORIZED");
        let err = model.predict(claim(incomplete), 0.5).unwrap_err();
        match err {
            ApiError::Validation(ValidationError::MissingFields(fields)) => {
                assert_eq!(fields, vec!["PRE-AUTHORIZED".to_string()])
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn batch_errors_name_the_row() {
        let model = demo_model();
        let mut broken = approved_claim();
        broken["CLAIMED_AMOUNT"] = Value::String("n/a".into());
        let payload = Payload::Batch(vec![claim(approved_claim()), claim(broken)]);

        let err = model.score(payload, None).unwrap_err();
        assert!(matches!(
            err,
            ApiError::Validation(ValidationError::Row { row: 1, .. })
        ));
    }

    #[test]
    fn batch_scores_every_row_with_the_loaded_threshold() {
        let model = demo_model();
        let payload = Payload::Batch(vec![claim(approved_claim()), claim(rejected_claim())]);
        match model.score(payload, None).unwrap() {
            Scored::Batch(predictions) => {
                let decisions: Vec<u8> = predictions.iter().map(|p| p.decision).collect();
                assert_eq!(decisions, vec![1, 0]);
                assert!(predictions.iter().all(|p| p.threshold == 0.5));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn probabilities_stay_in_unit_interval() {
        let model = demo_model();
        for (claimed, system) in [(1.0, 0.0), (0.0, 0.0), (1e9, 1.0), (10.0, 1e9), (-5.0, 3.0)] {
            let mut value = approved_claim();
            value["CLAIMED_AMOUNT"] = serde_json::json!(claimed);
            value["SYSTEM_CLAIMED_AMOUNT"] = serde_json::json!(system);
            let p = model.predict(claim(value), 0.5).unwrap();
            assert!((0.0..=1.0).contains(&p.proba_approved));
            assert_eq!(p.decision == 1, p.proba_approved >= p.threshold);
        }
    }

    #[test]
    fn threshold_override_is_validated() {
        assert_eq!(parse_threshold("0.7"), Ok(0.7));
        assert_eq!(parse_threshold(" 1 "), Ok(1.0));
        assert!(parse_threshold("1.2").is_err());
        assert!(parse_threshold("-0.1").is_err());
        assert!(parse_threshold("NaN").is_err());
        assert!(parse_threshold("high").is_err());
    }
}
