//! Rate limiting middleware.

use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, Query, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use tracing::{error, warn};

use super::error::payload_too_large;
use super::{to_iso8601, AppState};
use crate::ratelimit::{ClientKey, Decision};

pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";
pub const KEY_HEADER: &str = "x-ratelimit-key";
pub const USER_HEADER: &str = "x-user";

#[derive(Deserialize)]
struct UserQuery {
    user: Option<String>,
}

#[derive(Deserialize)]
struct UserBody {
    user: Option<Value>,
}

/// Admin routes and the health check are never rate limited.
fn is_exempt(path: &str) -> bool {
    path.starts_with("/admin/") || path == "/health"
}

/// Check every non-exempt request against the limiter.
///
/// Denied requests get a 429. If the limiter itself fails, the request is let
/// through so that a limiter fault never blocks legitimate traffic.
pub async fn enforce_rate_limit(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    if is_exempt(request.uri().path()) {
        return next.run(request).await;
    }

    let (request, user) = match identify_user(request, state.body_limit).await {
        Ok(found) => found,
        Err(response) => return response,
    };

    let remote = connect_info.map(|ConnectInfo(addr)| addr.ip());
    let key = ClientKey::resolve(user.as_deref(), remote).to_string_key();

    let decision = match state.limiter.check(&key, Utc::now()) {
        Ok(decision) => decision,
        Err(e) => {
            error!(key = %key, error = %e, "Rate limiting error, allowing request");
            return next.run(request).await;
        }
    };

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": "Too Many Requests",
                "key": key,
                "retryAfter": to_iso8601(decision.reset_time),
            })),
        )
            .into_response()
    };

    set_rate_limit_headers(response.headers_mut(), &decision, &key);
    response
}

fn set_rate_limit_headers(headers: &mut HeaderMap, decision: &Decision, key: &str) {
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    if let Ok(reset) = HeaderValue::from_str(&to_iso8601(decision.reset_time)) {
        headers.insert(RESET_HEADER, reset);
    }
    // User ids come from the client and may not be valid header text
    match HeaderValue::from_str(key) {
        Ok(value) => {
            headers.insert(KEY_HEADER, value);
        }
        Err(_) => warn!(key = %key, "Rate limit key is not a valid header value"),
    }
}

/// Find the user id of a request: query, then header, then JSON body.
///
/// Reading the body consumes it, so the request is rebuilt from the buffered
/// bytes before being returned.
async fn identify_user(
    request: Request,
    body_limit: usize,
) -> Result<(Request, Option<String>), Response> {
    if let Some(user) = query_user(request.uri()) {
        return Ok((request, Some(user)));
    }

    let header_user = request
        .headers()
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(str::to_owned);
    if header_user.is_some() {
        return Ok((request, header_user));
    }

    if !is_json(request.headers()) {
        return Ok((request, None));
    }

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, body_limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, limit = body_limit, "Failed to buffer request body");
            return Err(payload_too_large());
        }
    };

    let user = serde_json::from_slice::<UserBody>(&bytes)
        .ok()
        .and_then(|body| body.user)
        .and_then(|user| match user {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

    Ok((Request::from_parts(parts, Body::from(bytes)), user))
}

fn query_user(uri: &Uri) -> Option<String> {
    Query::<UserQuery>::try_from_uri(uri)
        .ok()
        .and_then(|Query(query)| query.user)
        .filter(|user| !user.trim().is_empty())
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim_start().starts_with("application/json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exempt_paths() {
        assert!(is_exempt("/health"));
        assert!(is_exempt("/admin/status"));
        assert!(is_exempt("/admin/config/default"));
        assert!(!is_exempt("/"));
        assert!(!is_exempt("/healthz"));
        assert!(!is_exempt("/administrator"));
    }

    #[test]
    fn test_query_user() {
        let uri: Uri = "/?user=alice&x=1".parse().unwrap();
        assert_eq!(query_user(&uri), Some("alice".to_string()));

        let uri: Uri = "/?user=".parse().unwrap();
        assert_eq!(query_user(&uri), None);

        let uri: Uri = "/".parse().unwrap();
        assert_eq!(query_user(&uri), None);
    }

    #[test]
    fn test_is_json() {
        let mut headers = HeaderMap::new();
        assert!(!is_json(&headers));

        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        assert!(is_json(&headers));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(!is_json(&headers));
    }
}
