//! `POST /tools/call`: the request/response transport over the dispatcher,
//! with the taxonomy-to-status mapping.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};

use hivemind::clock::utc_now_iso;

use crate::app::AppState;

/// Maps a taxonomy tag to its HTTP status.
pub fn status_for_kind(kind: Option<&str>) -> StatusCode {
    match kind {
        None => StatusCode::OK,
        Some("invalid_input") => StatusCode::BAD_REQUEST,
        Some("not_found") => StatusCode::NOT_FOUND,
        Some("governance_blocked") => StatusCode::LOCKED,
        Some("backend_unavailable") | Some("timeout") => StatusCode::SERVICE_UNAVAILABLE,
        Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Uniform HTTP error body.
pub fn error_body(message: &str, path: &str) -> Value {
    json!({
        "error": {
            "message": message,
            "timestamp": utc_now_iso(),
            "path": path,
        }
    })
}

/// Handles `{server?, tool, arguments?}` and returns the tool envelope with
/// the mapped status code.
pub async fn tools_call_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !state.authorized(&headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(error_body("missing or invalid bearer token", "/tools/call")),
        );
    }
    let Some(tool) = body
        .get("tool")
        .or_else(|| body.get("name"))
        .and_then(Value::as_str)
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(error_body("request requires a tool name", "/tools/call")),
        );
    };
    let server = body.get("server").and_then(Value::as_str);
    let args = body
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| json!({}));

    let result = state
        .hub
        .dispatcher
        .tools_call(server, tool, args)
        .await;
    let status = status_for_kind(result.error_kind);

    // Transport-level governance record: one per request, carrying the
    // final status. Failure here degrades to a warning.
    if let Err(e) = state
        .hub
        .dispatcher
        .governance()
        .record_http("http", "POST", "/tools/call", status.as_u16())
        .await
    {
        tracing::warn!(error = %e, "transport governance record failed");
    }

    let encoded = serde_json::to_value(&result)
        .unwrap_or_else(|e| error_body(&format!("encode: {}", e), "/tools/call"));
    (status, Json(encoded))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: each taxonomy kind maps to its documented status.
    #[test]
    fn status_mapping() {
        assert_eq!(status_for_kind(None), StatusCode::OK);
        assert_eq!(
            status_for_kind(Some("invalid_input")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_for_kind(Some("not_found")), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for_kind(Some("governance_blocked")),
            StatusCode::LOCKED
        );
        assert_eq!(
            status_for_kind(Some("backend_unavailable")),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for_kind(Some("timeout")),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for_kind(Some("duplicate")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for_kind(Some("internal")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    /// **Scenario**: error bodies carry message, timestamp, and path.
    #[test]
    fn error_body_shape() {
        let body = error_body("boom", "/tools/call");
        assert_eq!(body["error"]["message"], "boom");
        assert_eq!(body["error"]["path"], "/tools/call");
        assert!(body["error"]["timestamp"].is_string());
    }
}
