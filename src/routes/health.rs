use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub database: ComponentHealth,
    pub dispatch: DispatchHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct DispatchHealth {
    pub status: String,
    pub queue_depth: usize,
}

/// GET /health: store connectivity and dispatch queue state.
///
/// A backed-up dispatch queue does not make the service unhealthy: jobs are
/// still accepted and their items stay pending.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = std::time::Instant::now();

    let db_check = match state.orchestrator.health_check().await {
        Ok(()) => ComponentHealth {
            status: "ok".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
        },
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            ComponentHealth {
                status: "error".to_string(),
                latency_ms: None,
            }
        }
    };

    let dispatcher = state.orchestrator.dispatcher();
    let dispatch_check = DispatchHealth {
        status: if dispatcher.is_closed() {
            "stopped".to_string()
        } else {
            "ok".to_string()
        },
        queue_depth: dispatcher.queue_depth(),
    };

    let healthy = db_check.status == "ok";
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if healthy && dispatch_check.status == "ok" {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            database: db_check,
            dispatch: dispatch_check,
        },
    };

    (status_code, Json(response))
}
