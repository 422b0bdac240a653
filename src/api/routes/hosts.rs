//! Host endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
};

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{
        EventsResponse, HostDetailResponse, HostInfo, HostsResponse, PageQuery,
        ServiceStatusCounts,
    },
};
use crate::storage::schema::{HostId, ItemRef};

/// GET /api/v1/hosts
///
/// List all monitored hosts with the status of their availability service
pub async fn list_hosts(State(state): State<ApiState>) -> ApiResult<Json<HostsResponse>> {
    let mut hosts = Vec::new();
    for host in state.engine.store().list_hosts().await? {
        if let Some(view) = state.engine.host_view(host.id).await? {
            hosts.push(HostInfo::from(&view));
        }
    }

    Ok(Json(HostsResponse { hosts }))
}

/// GET /api/v1/hosts/:id
pub async fn get_host(
    State(state): State<ApiState>,
    Path(id): Path<HostId>,
) -> ApiResult<Json<HostDetailResponse>> {
    let view = state
        .engine
        .host_view(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("host {id} not found")))?;

    let services = state.engine.store().list_services(Some(id)).await?;
    let service_counts = ServiceStatusCounts::from_services(services.iter().filter(|s| s.is_active));
    let target = ItemRef::host(id);

    Ok(Json(HostDetailResponse {
        host: HostInfo::from(&view),
        acknowledged: state.engine.is_acknowledged(target).await?,
        scheduled_down: state.engine.is_scheduled_down(target).await?,
        service_counts,
        services,
    }))
}

/// GET /api/v1/hosts/:id/events
///
/// Events of every service of the host, newest first
pub async fn get_host_events(
    State(state): State<ApiState>,
    Path(id): Path<HostId>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<EventsResponse>> {
    if state.engine.store().get_host(id).await?.is_none() {
        return Err(ApiError::NotFound(format!("host {id} not found")));
    }

    let events = state
        .engine
        .events_for_host(id, page.offset, page.limit)
        .await?;
    Ok(Json(EventsResponse { events }))
}
