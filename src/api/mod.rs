//! REST API for the monitoring engine
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **Engine** shared behind an `Arc`, actor handles for scheduler and notifier
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Health check
//! - `GET /api/v1/summary` - Host and service counts per status
//! - `GET /api/v1/hosts` - List monitored hosts
//! - `GET /api/v1/hosts/:id` - Host detail with its services
//! - `GET /api/v1/hosts/:id/events` - Events of a host's services
//! - `GET /api/v1/services` - List services (`?host_id=` to filter)
//! - `GET /api/v1/services/:id` - Service state
//! - `POST /api/v1/services/:id/check` - Poll a service now
//! - `PUT /api/v1/services/:id/active` - Enable or disable polling
//! - `GET /api/v1/services/:id/events` - Events of a service
//! - `POST /api/v1/events` - Passive event ingestion
//! - `GET /api/v1/events/:id/correlated` - Events sharing a correlation id
//! - `GET /api/v1/alerts` - Events of alerting services
//! - `GET|POST /api/v1/acknowledgements`, `DELETE /api/v1/acknowledgements/:id`
//! - `GET|POST /api/v1/downtimes`, `DELETE /api/v1/downtimes/:id`
//! - `GET /api/v1/sensors/:provider` - Sensor catalogue of a provider
//! - `POST /api/v1/cycle` - Run a poll cycle now

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;
pub use types::{HealthResponse, HostInfo, HostsResponse, ServicesResponse, SummaryResponse};

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use tracing::info;

use crate::config::ApiConfig;

/// Routes without any layers
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/summary", get(routes::summary::get_summary))
        .route("/api/v1/sensors/:provider", get(routes::summary::list_sensors))
        .route("/api/v1/cycle", post(routes::summary::run_cycle))
        .route("/api/v1/hosts", get(routes::hosts::list_hosts))
        .route("/api/v1/hosts/:id", get(routes::hosts::get_host))
        .route("/api/v1/hosts/:id/events", get(routes::hosts::get_host_events))
        .route("/api/v1/services", get(routes::services::list_services))
        .route("/api/v1/services/:id", get(routes::services::get_service))
        .route("/api/v1/services/:id/check", post(routes::services::check_now))
        .route("/api/v1/services/:id/active", put(routes::services::set_active))
        .route(
            "/api/v1/services/:id/events",
            get(routes::services::get_service_events),
        )
        .route("/api/v1/events", post(routes::events::add_event))
        .route(
            "/api/v1/events/:id/correlated",
            get(routes::events::get_correlated),
        )
        .route("/api/v1/alerts", get(routes::events::get_alerts))
        .route(
            "/api/v1/acknowledgements",
            get(routes::acknowledgements::list_acknowledgements)
                .post(routes::acknowledgements::acknowledge),
        )
        .route(
            "/api/v1/acknowledgements/:id",
            delete(routes::acknowledgements::remove_acknowledgement),
        )
        .route(
            "/api/v1/downtimes",
            get(routes::downtimes::list_downtimes).post(routes::downtimes::schedule_downtime),
        )
        .route(
            "/api/v1/downtimes/:id",
            delete(routes::downtimes::cancel_downtime),
        )
        .with_state(state)
}

/// Router with tracing, CORS and authentication applied
pub fn app(config: &ApiConfig, state: ApiState) -> Router {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let mut app = router(state).layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    if let Some(token) = config.auth_token.clone() {
        app = app.layer(axum::middleware::from_fn_with_state(
            token,
            middleware::auth::auth_middleware,
        ));
    }

    app
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let app = app(&config, state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
