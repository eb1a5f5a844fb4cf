//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling; one task per
//! connection, routing on `(Method, path)`.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::Args;
use crate::db::MongoClient;
use crate::routes;
use crate::tracker::EndorsementTracker;
use crate::types::Result;

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Present when MongoDB is connected; `None` means dev-mode memory store
    pub mongo: Option<MongoClient>,
    pub tracker: Arc<EndorsementTracker>,
}

impl AppState {
    pub fn new(args: Args, mongo: Option<MongoClient>, tracker: Arc<EndorsementTracker>) -> Self {
        Self {
            args,
            mongo,
            tracker,
        }
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Tracker listening on {}", state.args.listen);
    if state.args.dev_mode {
        warn!("Development mode enabled - admin authentication disabled");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        // Liveness probe
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state))
        }

        // Readiness probe - 200 only when storage is available
        (Method::GET, "/ready") | (Method::GET, "/readyz") => {
            routes::readiness_check(Arc::clone(&state))
        }

        (Method::GET, "/version") => routes::version_info(),

        (Method::OPTIONS, _) => preflight_response(),

        // Endorsement lifecycle
        (Method::POST, "/api/v1/endorsements/start") => {
            routes::handle_start(req, Arc::clone(&state)).await
        }
        (Method::POST, "/api/v1/endorsements/end") => {
            routes::handle_end(req, Arc::clone(&state)).await
        }
        (Method::POST, "/api/v1/endorsements/position") => {
            routes::handle_update_position(req, Arc::clone(&state)).await
        }

        // Cumulative reads: /api/v1/endorsements/{userId}[/{entityType}/{entityId}]
        (Method::GET, p) if p.starts_with("/api/v1/endorsements/") => {
            match endorsement_segments(p) {
                Some([user_id]) => routes::handle_list(Arc::clone(&state), user_id).await,
                None => match endorsement_triple(p) {
                    Some((user_id, entity_type, entity_id)) => {
                        routes::handle_get_cumulative(
                            Arc::clone(&state),
                            user_id,
                            entity_type,
                            entity_id,
                        )
                        .await
                    }
                    None => not_found_response(&path),
                },
            }
        }

        // Admin corrective edits
        (Method::POST, "/admin/endorsements/backdate") => {
            routes::handle_backdate(req, Arc::clone(&state)).await
        }
        (Method::POST, "/admin/endorsements/periods") => {
            routes::handle_add_period(req, Arc::clone(&state)).await
        }
        (Method::DELETE, p) if p.starts_with("/admin/histories/") => {
            match period_delete_params(p) {
                Some((history_id, period_id)) => {
                    let (history_id, period_id) =
                        (history_id.to_string(), period_id.to_string());
                    routes::handle_delete_period(req, Arc::clone(&state), &history_id, &period_id)
                        .await
                }
                None => not_found_response(&path),
            }
        }
        (Method::POST, p) if p.starts_with("/admin/histories/") && p.ends_with("/totals") => {
            match totals_history_id(p) {
                Some(history_id) => {
                    let history_id = history_id.to_string();
                    routes::handle_set_totals(req, Arc::clone(&state), &history_id).await
                }
                None => not_found_response(&path),
            }
        }
        (Method::POST, p) if p.starts_with("/admin/users/") && p.ends_with("/bonus-days") => {
            match user_subresource(p, "bonus-days") {
                Some(user_id) => {
                    let user_id = user_id.to_string();
                    routes::handle_bonus_days(req, Arc::clone(&state), &user_id).await
                }
                None => not_found_response(&path),
            }
        }
        (Method::DELETE, p) if p.starts_with("/admin/users/") && p.ends_with("/endorsements") => {
            match user_subresource(p, "endorsements") {
                Some(user_id) => {
                    let user_id = user_id.to_string();
                    routes::handle_purge_user(req, Arc::clone(&state), &user_id).await
                }
                None => not_found_response(&path),
            }
        }

        _ => not_found_response(&path),
    };

    Ok(response)
}

/// Single path segment after /api/v1/endorsements/
fn endorsement_segments(path: &str) -> Option<[&str; 1]> {
    let rest = path.strip_prefix("/api/v1/endorsements/")?;
    if rest.is_empty() || rest.contains('/') {
        return None;
    }
    Some([rest])
}

/// Three path segments after /api/v1/endorsements/
fn endorsement_triple(path: &str) -> Option<(&str, &str, &str)> {
    let rest = path.strip_prefix("/api/v1/endorsements/")?;
    let mut parts = rest.split('/');
    let user_id = parts.next().filter(|s| !s.is_empty())?;
    let entity_type = parts.next().filter(|s| !s.is_empty())?;
    let entity_id = parts.next().filter(|s| !s.is_empty())?;
    if parts.next().is_some() {
        return None;
    }
    Some((user_id, entity_type, entity_id))
}

/// `{historyId}` and `{periodId}` from /admin/histories/{h}/periods/{p}
fn period_delete_params(path: &str) -> Option<(&str, &str)> {
    let rest = path.strip_prefix("/admin/histories/")?;
    let (history_id, period_id) = rest.split_once("/periods/")?;
    if history_id.is_empty() || period_id.is_empty() || period_id.contains('/') {
        return None;
    }
    Some((history_id, period_id))
}

/// `{historyId}` from /admin/histories/{h}/totals
fn totals_history_id(path: &str) -> Option<&str> {
    let rest = path.strip_prefix("/admin/histories/")?;
    let history_id = rest.strip_suffix("/totals")?;
    if history_id.is_empty() || history_id.contains('/') {
        return None;
    }
    Some(history_id)
}

/// `{userId}` from /admin/users/{u}/{suffix}
fn user_subresource<'a>(path: &'a str, suffix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix("/admin/users/")?;
    let user_id = rest.strip_suffix(suffix)?.strip_suffix('/')?;
    if user_id.is_empty() || user_id.contains('/') {
        return None;
    }
    Some(user_id)
}

fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, DELETE, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, X-Api-Key")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({ "error": format!("Not found: {}", path) }).to_string();
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endorsement_path_parsing() {
        assert_eq!(endorsement_segments("/api/v1/endorsements/u1"), Some(["u1"]));
        assert_eq!(endorsement_segments("/api/v1/endorsements/u1/brand/acme"), None);
        assert_eq!(
            endorsement_triple("/api/v1/endorsements/u1/brand/acme"),
            Some(("u1", "brand", "acme"))
        );
        assert_eq!(endorsement_triple("/api/v1/endorsements/u1"), None);
        assert_eq!(endorsement_triple("/api/v1/endorsements/u1/brand/acme/x"), None);
    }

    #[test]
    fn test_admin_path_parsing() {
        assert_eq!(
            period_delete_params("/admin/histories/u1_brand_acme/periods/p-42"),
            Some(("u1_brand_acme", "p-42"))
        );
        assert_eq!(period_delete_params("/admin/histories//periods/p"), None);

        assert_eq!(
            totals_history_id("/admin/histories/u1_brand_acme/totals"),
            Some("u1_brand_acme")
        );
        assert_eq!(totals_history_id("/admin/histories/a/b/totals"), None);

        assert_eq!(
            user_subresource("/admin/users/u1/bonus-days", "bonus-days"),
            Some("u1")
        );
        assert_eq!(
            user_subresource("/admin/users/u1/endorsements", "endorsements"),
            Some("u1")
        );
        assert_eq!(user_subresource("/admin/users//bonus-days", "bonus-days"), None);
    }
}
