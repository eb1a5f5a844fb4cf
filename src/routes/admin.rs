//! Admin endpoints for corrective edits
//!
//! Gated by the `x-api-key` header against `API_KEY_ADMIN` (skipped in dev
//! mode). These are direct mutation endpoints; the service layer does not
//! second-guess admin-supplied values.
//!
//! ## Endpoints
//!
//! - `POST /admin/endorsements/backdate` — rewrite the open period's start
//! - `POST /admin/endorsements/periods` — insert a historical period
//! - `DELETE /admin/histories/{historyId}/periods/{periodId}` — remove a period
//! - `POST /admin/histories/{historyId}/totals` — overwrite totals verbatim
//! - `POST /admin/users/{userId}/bonus-days` — referral bonus days
//! - `DELETE /admin/users/{userId}/endorsements` — purge on account deletion

use hyper::body::{Bytes, Incoming};
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;

use crate::db::schemas::EntityType;
use crate::routes::endorsements::{read_json, HistoryResponse};
use crate::routes::{error_response, json_response, parse_rfc3339};
use crate::server::AppState;
use crate::tracker::TotalsPatch;

type FullBody = http_body_util::Full<Bytes>;

/// Check the admin API key header
fn authorized(req: &Request<Incoming>, state: &AppState) -> bool {
    let presented = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());
    state.args.admin_key_matches(presented)
}

fn unauthorized() -> Response<FullBody> {
    json_response(
        StatusCode::UNAUTHORIZED,
        serde_json::json!({"error": "Invalid or missing admin API key"}),
    )
}

/// Request body for POST /admin/endorsements/backdate
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackdateRequest {
    pub user_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub entity_name: String,
    pub new_start_date: String,
}

/// Handle POST /admin/endorsements/backdate
pub async fn handle_backdate(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    if !authorized(&req, &state) {
        return unauthorized();
    }
    let body: BackdateRequest = match read_json(req).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let new_start = match parse_rfc3339(&body.new_start_date) {
        Ok(d) => d,
        Err(e) => return error_response(e),
    };

    match state
        .tracker
        .admin_backdate(
            &body.user_id,
            body.entity_type,
            &body.entity_id,
            &body.entity_name,
            new_start,
        )
        .await
    {
        Ok(()) => json_response(StatusCode::OK, serde_json::json!({"ok": true})),
        Err(e) => error_response(e),
    }
}

/// Request body for POST /admin/endorsements/periods
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPeriodRequest {
    pub user_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub entity_name: String,
    pub start_date: String,
    pub end_date: Option<String>,
    #[serde(default = "default_start_position")]
    pub start_position: i32,
}

fn default_start_position() -> i32 {
    1
}

/// Handle POST /admin/endorsements/periods
pub async fn handle_add_period(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    if !authorized(&req, &state) {
        return unauthorized();
    }
    let body: AddPeriodRequest = match read_json(req).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let start = match parse_rfc3339(&body.start_date) {
        Ok(d) => d,
        Err(e) => return error_response(e),
    };
    let end = match body.end_date.as_deref().map(parse_rfc3339).transpose() {
        Ok(d) => d,
        Err(e) => return error_response(e),
    };

    match state
        .tracker
        .admin_add_backdated_period(
            &body.user_id,
            body.entity_type,
            &body.entity_id,
            &body.entity_name,
            start,
            end,
            body.start_position,
        )
        .await
    {
        Ok(doc) => json_response(StatusCode::OK, HistoryResponse::from_doc(&doc)),
        Err(e) => error_response(e),
    }
}

/// Handle DELETE /admin/histories/{historyId}/periods/{periodId}
pub async fn handle_delete_period(
    req: Request<Incoming>,
    state: Arc<AppState>,
    history_id: &str,
    period_id: &str,
) -> Response<FullBody> {
    if !authorized(&req, &state) {
        return unauthorized();
    }

    match state.tracker.admin_delete_period(history_id, period_id).await {
        Ok(()) => json_response(StatusCode::OK, serde_json::json!({"ok": true})),
        Err(e) => error_response(e),
    }
}

/// Request body for POST /admin/histories/{historyId}/totals
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetTotalsRequest {
    pub total_days_endorsed: Option<i64>,
    pub total_days_in_top5: Option<i64>,
    pub total_days_in_top10: Option<i64>,
}

/// Handle POST /admin/histories/{historyId}/totals
pub async fn handle_set_totals(
    req: Request<Incoming>,
    state: Arc<AppState>,
    history_id: &str,
) -> Response<FullBody> {
    if !authorized(&req, &state) {
        return unauthorized();
    }
    let body: SetTotalsRequest = match read_json(req).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let patch = TotalsPatch {
        total_days_endorsed: body.total_days_endorsed,
        total_days_in_top5: body.total_days_in_top5,
        total_days_in_top10: body.total_days_in_top10,
    };

    match state.tracker.admin_set_totals(history_id, patch).await {
        Ok(()) => json_response(StatusCode::OK, serde_json::json!({"ok": true})),
        Err(e) => error_response(e),
    }
}

/// Request body for POST /admin/users/{userId}/bonus-days
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BonusDaysRequest {
    pub bonus_days: i64,
}

/// Handle POST /admin/users/{userId}/bonus-days
pub async fn handle_bonus_days(
    req: Request<Incoming>,
    state: Arc<AppState>,
    user_id: &str,
) -> Response<FullBody> {
    if !authorized(&req, &state) {
        return unauthorized();
    }
    let body: BonusDaysRequest = match read_json(req).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    match state.tracker.add_bonus_days(user_id, body.bonus_days).await {
        Ok(updated) => json_response(StatusCode::OK, serde_json::json!({"updated": updated})),
        Err(e) => error_response(e),
    }
}

/// Handle DELETE /admin/users/{userId}/endorsements
pub async fn handle_purge_user(
    req: Request<Incoming>,
    state: Arc<AppState>,
    user_id: &str,
) -> Response<FullBody> {
    if !authorized(&req, &state) {
        return unauthorized();
    }

    match state.tracker.purge_user(user_id).await {
        Ok(purged) => json_response(StatusCode::OK, serde_json::json!({"purged": purged})),
        Err(e) => error_response(e),
    }
}
