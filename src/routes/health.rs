//! Health check endpoints
//!
//! - /health, /healthz - liveness probe (is the service running?)
//! - /ready, /readyz - readiness probe (is storage available?)
//!
//! Liveness always returns 200 while the process is up. Readiness returns
//! 200 only when MongoDB is connected, unless dev mode is on (the in-memory
//! store serves traffic without MongoDB in dev mode).

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::routes::json_response;
use crate::server::AppState;

/// Health response body
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall health status (true if service is running)
    pub healthy: bool,
    /// 'online' when storage is available, 'degraded' otherwise
    pub status: &'static str,
    /// Service version
    pub version: &'static str,
    /// Current timestamp
    pub timestamp: String,
    /// Operating mode
    pub mode: String,
    /// Storage backend status
    pub storage: StorageHealth,
}

/// Storage backend details
#[derive(Serialize)]
pub struct StorageHealth {
    /// Whether MongoDB is connected
    pub connected: bool,
    /// Active backend ("mongodb" or "memory")
    pub backend: &'static str,
}

fn build_health_response(state: &AppState) -> HealthResponse {
    let connected = state.mongo.is_some();

    HealthResponse {
        healthy: true,
        status: if connected || state.args.dev_mode {
            "online"
        } else {
            "degraded"
        },
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if state.args.dev_mode {
            "development".to_string()
        } else {
            "production".to_string()
        },
        storage: StorageHealth {
            connected,
            backend: if connected { "mongodb" } else { "memory" },
        },
    }
}

/// Handle liveness probe (/health, /healthz)
pub fn health_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, build_health_response(&state))
}

/// Handle readiness probe (/ready, /readyz)
///
/// Use this for load balancer health checks.
pub fn readiness_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let response = build_health_response(&state);
    let status = if response.storage.connected || state.args.dev_mode {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    json_response(status, response)
}

/// Version information for deployment verification
#[derive(Serialize)]
pub struct VersionResponse {
    /// Cargo package version
    pub version: &'static str,
    /// Service name
    pub service: &'static str,
}

/// Handle version endpoint (/version)
pub fn version_info() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        VersionResponse {
            version: env!("CARGO_PKG_VERSION"),
            service: "iendorse-tracker",
        },
    )
}
