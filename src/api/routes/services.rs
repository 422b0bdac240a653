//! Service endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{ActiveRequest, CheckNowResponse, EventsResponse, PageQuery, ServicesResponse},
};
use crate::storage::schema::{HostId, Service, ServiceId};

#[derive(Debug, Deserialize)]
pub struct ServiceQuery {
    host_id: Option<HostId>,
}

/// GET /api/v1/services
///
/// List services, optionally only those of one host
pub async fn list_services(
    State(state): State<ApiState>,
    Query(query): Query<ServiceQuery>,
) -> ApiResult<Json<ServicesResponse>> {
    let services = state.engine.store().list_services(query.host_id).await?;
    Ok(Json(ServicesResponse { services }))
}

/// GET /api/v1/services/:id
pub async fn get_service(
    State(state): State<ApiState>,
    Path(id): Path<ServiceId>,
) -> ApiResult<Json<Service>> {
    state
        .engine
        .store()
        .get_service(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("service {id} not found")))
}

/// POST /api/v1/services/:id/check
///
/// Polls the service immediately
pub async fn check_now(
    State(state): State<ApiState>,
    Path(id): Path<ServiceId>,
) -> ApiResult<Json<CheckNowResponse>> {
    let reported = match &state.scheduler {
        Some(scheduler) => scheduler.check_now(id).await?,
        None => state.engine.check_now(id).await?,
    };

    Ok(Json(CheckNowResponse {
        service_id: id,
        reported,
    }))
}

/// PUT /api/v1/services/:id/active
pub async fn set_active(
    State(state): State<ApiState>,
    Path(id): Path<ServiceId>,
    Json(request): Json<ActiveRequest>,
) -> ApiResult<StatusCode> {
    state.engine.set_service_active(id, request.active).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/services/:id/events
pub async fn get_service_events(
    State(state): State<ApiState>,
    Path(id): Path<ServiceId>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<EventsResponse>> {
    let events = state
        .engine
        .events_for_service(id, page.offset, page.limit)
        .await?;
    Ok(Json(EventsResponse { events }))
}
