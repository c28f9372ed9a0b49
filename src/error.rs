use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Problems that stop the service from starting. Never surfaced over HTTP.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid model artifact: {0}")]
    InvalidArtifact(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("server stopped with an error: {0}")]
    Serve(std::io::Error),
}

/// Bad client input. Always a 400.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("malformed JSON body: {0}")]
    MalformedJson(String),

    #[error("payload must be a JSON object or a list of JSON objects")]
    UnsupportedPayload,

    #[error("payload list is empty")]
    EmptyBatch,

    #[error("missing required field(s): {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("field {field} is invalid: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("malformed query string: {0}")]
    MalformedQuery(String),

    #[error("threshold must be a number between 0 and 1, got {0}")]
    InvalidThreshold(String),

    #[error("row {row}: {source}")]
    Row {
        row: usize,
        source: Box<ValidationError>,
    },
}

impl ValidationError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn in_row(self, row: usize) -> Self {
        Self::Row {
            row,
            source: Box::new(self),
        }
    }
}

/// The model could not score a well-formed request. Always a 500.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InferenceError {
    #[error("encoded feature vector has {got} columns, model expects {expected}")]
    FeatureWidth { expected: usize, got: usize },

    #[error("could not encode column {column}: {reason}")]
    Encoding { column: String, reason: &'static str },

    #[error("model produced a non-finite score ({0})")]
    NonFiniteScore(f64),

    #[error("inference worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Validation(e) => tracing::warn!(error = %e, "rejected prediction request"),
            ApiError::Inference(e) => tracing::error!(error = %e, "prediction failed"),
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
