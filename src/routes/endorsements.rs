//! Endorsement lifecycle endpoints
//!
//! ## Endpoints
//!
//! - `POST /api/v1/endorsements/start` — begin (or re-assert) an endorsement
//! - `POST /api/v1/endorsements/end` — remove an endorsement
//! - `POST /api/v1/endorsements/position` — record a rank change
//! - `GET /api/v1/endorsements/{userId}` — list a user's histories
//! - `GET /api/v1/endorsements/{userId}/{entityType}/{entityId}` — cumulative totals

use http_body_util::BodyExt;
use hyper::body::{Bytes, Incoming};
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::schemas::{EndorsementHistoryDoc, EntityType};
use crate::routes::{error_response, json_response, parse_rfc3339, to_rfc3339};
use crate::server::AppState;

type FullBody = http_body_util::Full<Bytes>;

/// Wire view of a history document, with derived current-state fields
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub id: String,
    pub user_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub entity_name: String,
    pub total_days_endorsed: i64,
    pub total_days_in_top5: i64,
    pub total_days_in_top10: i64,
    pub is_currently_endorsed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_position: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_period_start_date: Option<String>,
    pub periods: Vec<PeriodView>,
}

/// Wire view of a single period
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodView {
    pub id: String,
    pub start_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    pub start_position: i32,
    pub position_history: Vec<PositionView>,
    pub days_in_period: i64,
    pub days_in_top5: i64,
    pub days_in_top10: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionView {
    pub date: String,
    pub position: i32,
}

impl HistoryResponse {
    pub fn from_doc(doc: &EndorsementHistoryDoc) -> Self {
        Self {
            id: doc.id(),
            user_id: doc.user_id.clone(),
            entity_type: doc.entity_type,
            entity_id: doc.entity_id.clone(),
            entity_name: doc.entity_name.clone(),
            total_days_endorsed: doc.total_days_endorsed,
            total_days_in_top5: doc.total_days_in_top5,
            total_days_in_top10: doc.total_days_in_top10,
            is_currently_endorsed: doc.is_currently_endorsed(),
            current_position: doc.current_position(),
            current_period_start_date: doc.current_period_start().map(to_rfc3339),
            periods: doc
                .periods
                .iter()
                .map(|p| PeriodView {
                    id: p.id.clone(),
                    start_date: to_rfc3339(p.start_date),
                    end_date: p.end_date.map(to_rfc3339),
                    start_position: p.start_position,
                    position_history: p
                        .position_history
                        .iter()
                        .map(|c| PositionView {
                            date: to_rfc3339(c.date),
                            position: c.position,
                        })
                        .collect(),
                    days_in_period: p.days_in_period,
                    days_in_top5: p.days_in_top5,
                    days_in_top10: p.days_in_top10,
                })
                .collect(),
        }
    }
}

/// Read and deserialize a JSON request body
pub(crate) async fn read_json<T: for<'de> Deserialize<'de>>(
    req: Request<Incoming>,
) -> Result<T, Response<FullBody>> {
    let body = match req.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return Err(json_response(
                StatusCode::BAD_REQUEST,
                serde_json::json!({"error": format!("Failed to read request body: {}", e)}),
            ));
        }
    };

    serde_json::from_slice(&body).map_err(|e| {
        json_response(
            StatusCode::BAD_REQUEST,
            serde_json::json!({"error": format!("Invalid JSON: {}", e)}),
        )
    })
}

/// Request body for POST /api/v1/endorsements/start
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub user_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub entity_name: String,
    pub position: Option<i32>,
    pub start_date: Option<String>,
}

/// Handle POST /api/v1/endorsements/start
pub async fn handle_start(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let body: StartRequest = match read_json(req).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let start_date = match body.start_date.as_deref().map(parse_rfc3339).transpose() {
        Ok(d) => d,
        Err(e) => return error_response(e),
    };

    match state
        .tracker
        .start_period(
            &body.user_id,
            body.entity_type,
            &body.entity_id,
            &body.entity_name,
            body.position,
            start_date,
        )
        .await
    {
        Ok(doc) => json_response(StatusCode::OK, HistoryResponse::from_doc(&doc)),
        Err(e) => error_response(e),
    }
}

/// Request body for POST /api/v1/endorsements/end
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndRequest {
    pub user_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub end_date: Option<String>,
}

/// Handle POST /api/v1/endorsements/end
///
/// Returns JSON `null` when no history exists (documented no-op).
pub async fn handle_end(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let body: EndRequest = match read_json(req).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let end_date = match body.end_date.as_deref().map(parse_rfc3339).transpose() {
        Ok(d) => d,
        Err(e) => return error_response(e),
    };

    match state
        .tracker
        .end_period(&body.user_id, body.entity_type, &body.entity_id, end_date)
        .await
    {
        Ok(Some(doc)) => json_response(StatusCode::OK, HistoryResponse::from_doc(&doc)),
        Ok(None) => json_response(StatusCode::OK, serde_json::Value::Null),
        Err(e) => error_response(e),
    }
}

/// Request body for POST /api/v1/endorsements/position
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRequest {
    pub user_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub position: i32,
}

/// Handle POST /api/v1/endorsements/position
pub async fn handle_update_position(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<FullBody> {
    let body: PositionRequest = match read_json(req).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    match state
        .tracker
        .update_position(&body.user_id, body.entity_type, &body.entity_id, body.position)
        .await
    {
        Ok(Some(doc)) => json_response(StatusCode::OK, HistoryResponse::from_doc(&doc)),
        Ok(None) => json_response(
            StatusCode::NOT_FOUND,
            serde_json::json!({"error": "No endorsement history for this entity"}),
        ),
        Err(e) => error_response(e),
    }
}

/// Handle GET /api/v1/endorsements/{userId}/{entityType}/{entityId}
pub async fn handle_get_cumulative(
    state: Arc<AppState>,
    user_id: &str,
    entity_type: &str,
    entity_id: &str,
) -> Response<FullBody> {
    let entity_type: EntityType = match entity_type.parse() {
        Ok(t) => t,
        Err(e) => {
            return json_response(StatusCode::BAD_REQUEST, serde_json::json!({"error": e}));
        }
    };

    match state
        .tracker
        .get_cumulative(user_id, entity_type, entity_id)
        .await
    {
        Ok(totals) => json_response(StatusCode::OK, totals),
        Err(e) => error_response(e),
    }
}

/// Response for GET /api/v1/endorsements/{userId}
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryListResponse {
    pub total: usize,
    pub histories: Vec<HistoryResponse>,
}

/// Handle GET /api/v1/endorsements/{userId}
pub async fn handle_list(state: Arc<AppState>, user_id: &str) -> Response<FullBody> {
    match state.tracker.list_histories(user_id).await {
        Ok(docs) => {
            let histories: Vec<HistoryResponse> =
                docs.iter().map(HistoryResponse::from_doc).collect();
            json_response(
                StatusCode::OK,
                HistoryListResponse {
                    total: histories.len(),
                    histories,
                },
            )
        }
        Err(e) => error_response(e),
    }
}
