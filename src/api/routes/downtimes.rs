//! Scheduled downtime endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::api::{
    error::ApiResult,
    state::ApiState,
    types::{AcceptedResponse, DowntimeRequest, TargetQuery},
};
use crate::storage::schema::{DowntimeId, ScheduledDowntime};

/// POST /api/v1/downtimes
pub async fn schedule_downtime(
    State(state): State<ApiState>,
    Json(request): Json<DowntimeRequest>,
) -> ApiResult<(StatusCode, Json<ScheduledDowntime>)> {
    let downtime = ScheduledDowntime {
        id: 0,
        name: request.name,
        comment: request.comment,
        target: request.target,
        is_fixed: request.is_fixed,
        begin: request.begin,
        end: request.end,
        is_cancelled: false,
    };

    let downtime = state.engine.schedule_downtime(downtime).await?;
    Ok((StatusCode::CREATED, Json(downtime)))
}

/// GET /api/v1/downtimes?kind=host&id=1
///
/// Downtimes targeting the item, cancelled ones included
pub async fn list_downtimes(
    State(state): State<ApiState>,
    Query(query): Query<TargetQuery>,
) -> ApiResult<Json<Vec<ScheduledDowntime>>> {
    Ok(Json(state.engine.downtimes_for(query.target()).await?))
}

/// DELETE /api/v1/downtimes/:id
///
/// Ends the downtime now; `accepted` is false when it was already cancelled
pub async fn cancel_downtime(
    State(state): State<ApiState>,
    Path(id): Path<DowntimeId>,
) -> ApiResult<Json<AcceptedResponse>> {
    let accepted = state.engine.cancel_downtime(id).await?;
    Ok(Json(AcceptedResponse { accepted }))
}
