pub mod routes;

use serde::{Deserialize, Serialize};

use crate::model::Prediction;

#[derive(Debug, Deserialize)]
pub struct PredictQuery {
    pub threshold: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RowPrediction {
    pub row_id: usize,
    #[serde(flatten)]
    pub prediction: Prediction,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub n: usize,
    pub predictions: Vec<RowPrediction>,
}

impl BatchResponse {
    pub fn new(predictions: Vec<Prediction>) -> Self {
        let predictions: Vec<RowPrediction> = predictions
            .into_iter()
            .enumerate()
            .map(|(row_id, prediction)| RowPrediction { row_id, prediction })
            .collect();
        Self {
            n: predictions.len(),
            predictions,
        }
    }
}
