use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use crate::claims::{parse_payload, Payload};
use crate::error::{ApiError, InferenceError, ValidationError};
use crate::model::{parse_threshold, Scored};
use crate::state::AppState;
use super::{BatchResponse, PredictQuery};

/// Score one claim or a list of claims. The body is read as JSON whatever
/// the declared content type.
pub async fn predict(
    State(state): State<AppState>,
    query: Result<Query<PredictQuery>, QueryRejection>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let Query(query) = query.map_err(|e| ValidationError::MalformedQuery(e.body_text()))?;
    let threshold = query.threshold.as_deref().map(parse_threshold).transpose()?;
    let payload = parse_payload(&body)?;
    let rows = match &payload {
        Payload::Single(_) => 1,
        Payload::Batch(claims) => claims.len(),
    };

    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("predict", %request_id, rows);
    let model = state.model.clone();

    let scored = tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        let scored = model.score(payload, threshold);
        if let Ok(Scored::Single(p)) = &scored {
            tracing::info!(decision = p.decision, proba = p.proba_approved, "claim scored");
        } else if let Ok(Scored::Batch(predictions)) = &scored {
            let approved = predictions.iter().filter(|p| p.decision == 1).count();
            tracing::info!(approved, "batch scored");
        }
        scored
    })
    .await
    .map_err(|e| InferenceError::Worker(e.to_string()))??;

    Ok(match scored {
        Scored::Single(prediction) => Json(prediction).into_response(),
        Scored::Batch(predictions) => Json(BatchResponse::new(predictions)).into_response(),
    })
}
