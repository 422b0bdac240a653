//! Status summary, sensor catalogue and scheduler endpoints

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::warn;

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{CycleResponse, SummaryResponse},
};
use crate::sensors::SensorDefinition;

/// GET /api/v1/summary
pub async fn get_summary(State(state): State<ApiState>) -> ApiResult<Json<SummaryResponse>> {
    let summary = state.engine.status_summary().await?;

    let notifications = match &state.notifier {
        Some(notifier) => match notifier.get_stats().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!("failed to get notifier stats: {e}");
                None
            }
        },
        None => None,
    };

    Ok(Json(SummaryResponse {
        summary,
        timestamp: state.engine.now(),
        notifications,
    }))
}

/// GET /api/v1/sensors/:provider
///
/// Sensors a provider offers, keyed by sensor name
pub async fn list_sensors(
    State(state): State<ApiState>,
    Path(provider): Path<String>,
) -> Json<BTreeMap<String, SensorDefinition>> {
    Json(state.engine.sensors().definitions(&provider))
}

/// POST /api/v1/cycle
///
/// Runs a poll cycle immediately
pub async fn run_cycle(State(state): State<ApiState>) -> ApiResult<Json<CycleResponse>> {
    let scheduler = state
        .scheduler
        .as_ref()
        .ok_or_else(|| ApiError::InvalidRequest("scheduler is not running".to_string()))?;

    let report = scheduler.run_cycle_now().await?;
    Ok(Json(CycleResponse {
        volume: report.volume(),
        report,
    }))
}
