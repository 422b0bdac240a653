//! Acknowledgement endpoints

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::AcceptedResponse,
};
use crate::engine::AcknowledgeRequest;
use crate::storage::schema::{Acknowledgement, AcknowledgementId};

/// GET /api/v1/acknowledgements
pub async fn list_acknowledgements(
    State(state): State<ApiState>,
) -> ApiResult<Json<Vec<Acknowledgement>>> {
    Ok(Json(state.engine.acknowledgements().await?))
}

/// POST /api/v1/acknowledgements
///
/// `accepted` is false when the item is scheduled down, not alerting or
/// already acknowledged
pub async fn acknowledge(
    State(state): State<ApiState>,
    Json(request): Json<AcknowledgeRequest>,
) -> ApiResult<Json<AcceptedResponse>> {
    if request.user.trim().is_empty() {
        return Err(ApiError::InvalidRequest("user is required".to_string()));
    }

    let accepted = state.engine.acknowledge(request).await?;
    Ok(Json(AcceptedResponse { accepted }))
}

/// DELETE /api/v1/acknowledgements/:id
pub async fn remove_acknowledgement(
    State(state): State<ApiState>,
    Path(id): Path<AcknowledgementId>,
) -> ApiResult<StatusCode> {
    if state.engine.remove_acknowledgement(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("acknowledgement {id} not found")))
    }
}
