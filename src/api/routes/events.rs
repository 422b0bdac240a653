//! Event ingestion and query endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{AddEventResponse, EventsResponse},
};
use crate::engine::EventInput;
use crate::storage::schema::EventId;

/// Default number of alert events returned
const DEFAULT_ALERT_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct CorrelatedQuery {
    /// Leave the event itself out of the result
    #[serde(default)]
    exclusive: bool,
}

#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    limit: Option<usize>,
}

/// POST /api/v1/events
///
/// Passive ingestion of an observation
pub async fn add_event(
    State(state): State<ApiState>,
    Json(input): Json<EventInput>,
) -> ApiResult<Json<AddEventResponse>> {
    if input.service_id.is_none() {
        return Err(ApiError::InvalidRequest("service_id is required".to_string()));
    }

    let event = state.engine.add_event(input).await?;
    Ok(Json(AddEventResponse {
        stored: event.is_some(),
        event,
    }))
}

/// GET /api/v1/events/:id/correlated
pub async fn get_correlated(
    State(state): State<ApiState>,
    Path(id): Path<EventId>,
    Query(query): Query<CorrelatedQuery>,
) -> ApiResult<Json<EventsResponse>> {
    let event = state
        .engine
        .store()
        .get_event(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("event {id} not found")))?;

    let events = state.engine.get_correlated(&event, query.exclusive).await?;
    Ok(Json(EventsResponse { events }))
}

/// GET /api/v1/alerts
///
/// Newest events of services currently in an alert state
pub async fn get_alerts(
    State(state): State<ApiState>,
    Query(query): Query<AlertQuery>,
) -> ApiResult<Json<EventsResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_ALERT_LIMIT);
    let events = state.engine.active_alerts(Some(limit)).await?;
    Ok(Json(EventsResponse { events }))
}
