//! HTTP routes for the tracker

pub mod admin;
pub mod endorsements;
pub mod health;

pub use admin::{
    handle_add_period, handle_backdate, handle_bonus_days, handle_delete_period,
    handle_purge_user, handle_set_totals,
};
pub use endorsements::{
    handle_end, handle_get_cumulative, handle_list, handle_start, handle_update_position,
    HistoryResponse,
};
pub use health::{health_check, readiness_check, version_info};

use bson::DateTime;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::types::TrackerError;

/// Serialize a value into a JSON response
pub(crate) fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response<Full<Bytes>> {
    let body = serde_json::to_string(&body)
        .unwrap_or_else(|_| r#"{"error":"Serialization failed"}"#.to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Map a tracker error onto an HTTP status + JSON error body
pub(crate) fn error_response(err: TrackerError) -> Response<Full<Bytes>> {
    let status = match &err {
        TrackerError::NotFound(_) => StatusCode::NOT_FOUND,
        TrackerError::Conflict(_) => StatusCode::CONFLICT,
        TrackerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        TrackerError::Database(_) | TrackerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    json_response(status, serde_json::json!({ "error": err.to_string() }))
}

/// Parse an RFC3339 date string from the wire into a bson timestamp
pub(crate) fn parse_rfc3339(s: &str) -> Result<DateTime, TrackerError> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| DateTime::from_chrono(dt.with_timezone(&chrono::Utc)))
        .map_err(|e| TrackerError::InvalidInput(format!("Invalid RFC3339 date '{}': {}", s, e)))
}

/// Render a bson timestamp as an RFC3339 string for responses
pub(crate) fn to_rfc3339(date: DateTime) -> String {
    date.to_chrono().to_rfc3339()
}
