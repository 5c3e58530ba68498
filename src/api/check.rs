//! Check endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Request, State},
    http::{header::HeaderName, request::Parts, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::check::{CheckOutcome, CheckRequest, Decision, HttpResponse};
use crate::service::AuthService;
use crate::telemetry::AdminState;

/// Header listing upstream headers to remove, understood by Envoy's HTTP
/// authorization service mode.
pub const HEADERS_TO_REMOVE: &str = "x-envoy-auth-headers-to-remove";

/// Shared state of the check listener.
pub struct CheckState {
    pub service: Arc<AuthService>,
    pub admin: Arc<AdminState>,
}

impl CheckState {
    pub fn new(service: Arc<AuthService>, admin: Arc<AdminState>) -> Self {
        Self { service, admin }
    }

    async fn check(&self, request: CheckRequest) -> CheckOutcome {
        let _in_flight = InFlight::new(&self.admin);
        let outcome = self.service.check(request).await;
        self.admin.record_decision(outcome.decision);
        outcome
    }
}

/// Keeps the active check gauge accurate when a check is cancelled.
struct InFlight<'a>(&'a AdminState);

impl<'a> InFlight<'a> {
    fn new(state: &'a AdminState) -> Self {
        state.check_started();
        Self(state)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.check_ended();
    }
}

/// Status returned with every JSON check reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcStatus {
    /// google.rpc code
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

/// JSON check reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReply {
    pub status: RpcStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_response: Option<HttpResponse>,
}

impl CheckReply {
    fn from_decision(decision: Decision, http_response: Option<HttpResponse>) -> Self {
        Self {
            status: RpcStatus {
                code: decision.status_code().as_i32(),
                message: decision.message().to_string(),
            },
            http_response,
        }
    }
}

fn http_status(decision: Decision) -> StatusCode {
    match decision {
        Decision::Allow => StatusCode::OK,
        Decision::InvalidArgument => StatusCode::BAD_REQUEST,
        Decision::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Build the JSON check router: `POST /v1/check` takes a [`CheckRequest`].
pub fn check_router(state: Arc<CheckState>) -> Router {
    Router::new()
        .route("/v1/check", post(json_check_handler))
        .with_state(state)
}

/// Build the Envoy HTTP-mode router.
///
/// Every request, whatever its method and path, is a proxied request to
/// check. It must be served on its own listener.
pub fn envoy_router(state: Arc<CheckState>) -> Router {
    Router::new()
        .fallback(envoy_check_handler)
        .with_state(state)
}

/// JSON check handler.
pub async fn json_check_handler(
    State(state): State<Arc<CheckState>>,
    body: Result<Json<CheckRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!(error = %rejection, "rejected check body");
            let decision = Decision::InvalidArgument;
            return (
                http_status(decision),
                Json(CheckReply::from_decision(decision, None)),
            );
        }
    };

    let outcome = state.check(request).await;
    (
        http_status(outcome.decision),
        Json(CheckReply::from_decision(
            outcome.decision,
            outcome.response.http_response,
        )),
    )
}

/// Envoy HTTP-mode check handler.
pub async fn envoy_check_handler(
    State(state): State<Arc<CheckState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    request: Request,
) -> Response {
    let (parts, _body) = request.into_parts();
    let check = check_request_from_parts(&parts, peer.map(|ConnectInfo(addr)| addr));

    let outcome = state.check(check).await;
    envoy_response(outcome)
}

/// Describe a proxied HTTP request as a check request.
pub fn check_request_from_parts(parts: &Parts, peer: Option<SocketAddr>) -> CheckRequest {
    let headers = &parts.headers;
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let host = header("host")
        .map(str::to_string)
        .or_else(|| parts.uri.authority().map(|a| a.to_string()))
        .unwrap_or_default();
    let scheme = header("x-forwarded-proto")
        .or_else(|| parts.uri.scheme_str())
        .unwrap_or("http")
        .to_string();
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let mut check = CheckRequest::new(parts.method.as_str(), scheme, host, path)
        .with_protocol(format!("{:?}", parts.version));

    if let Some(id) = header("x-request-id") {
        check = check.with_id(id);
    }
    if let Some(addr) = peer {
        check = check.with_source(addr.to_string());
    }

    for name in headers.keys() {
        let values: Vec<&str> = headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if !values.is_empty() {
            check = check.with_header(name.as_str(), values.join(","));
        }
    }

    check
}

/// Translate an outcome into an Envoy HTTP-mode reply.
pub fn envoy_response(outcome: CheckOutcome) -> Response {
    match outcome.decision {
        Decision::Allow => {}
        decision => return http_status(decision).into_response(),
    }

    match outcome.response.http_response {
        Some(HttpResponse::DeniedResponse(denied)) => {
            let status = StatusCode::from_u16(denied.status).unwrap_or(StatusCode::FORBIDDEN);
            let mut response = (status, denied.body).into_response();
            append_headers(
                &mut response,
                denied.headers.iter().map(|h| (h.key.as_str(), h.value.as_str())),
            );
            response
        }
        Some(HttpResponse::OkResponse(ok)) => {
            let mut response = StatusCode::OK.into_response();
            append_headers(
                &mut response,
                ok.headers
                    .iter()
                    .chain(ok.response_headers_to_add.iter())
                    .map(|h| (h.key.as_str(), h.value.as_str())),
            );
            if !ok.headers_to_remove.is_empty() {
                let removed = ok.headers_to_remove.join(",");
                append_headers(&mut response, [(HEADERS_TO_REMOVE, removed.as_str())]);
            }
            response
        }
        None => StatusCode::OK.into_response(),
    }
}

fn append_headers<'a>(
    response: &mut Response,
    headers: impl IntoIterator<Item = (&'a str, &'a str)>,
) {
    let map = response.headers_mut();
    for (key, value) in headers {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.append(name, value);
            }
            _ => warn!(header = %key, "dropping invalid response header"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::{CheckResponse, HeaderValue as CheckHeader};
    use axum::http::{Method, Request as HttpRequest};

    #[test]
    fn test_request_from_parts() {
        let (parts, _) = HttpRequest::builder()
            .method(Method::POST)
            .uri("/secure/data?x=1")
            .header("host", "api.example.com:8443")
            .header("x-forwarded-proto", "https")
            .header("x-request-id", "req-1")
            .header("accept", "text/html")
            .header("accept", "application/json")
            .body(())
            .unwrap()
            .into_parts();

        let check = check_request_from_parts(&parts, Some("10.0.0.1:5555".parse().unwrap()));
        let http = check.http();

        assert_eq!(http.method, "POST");
        assert_eq!(http.path, "/secure/data?x=1");
        assert_eq!(http.host, "api.example.com:8443");
        assert_eq!(http.scheme, "https");
        assert_eq!(http.id, "req-1");
        assert_eq!(http.protocol, "HTTP/1.1");
        assert_eq!(check.header("accept"), Some("text/html,application/json"));
        assert_eq!(check.attributes.source.unwrap().address, "10.0.0.1:5555");
    }

    #[test]
    fn test_envoy_response_ok() {
        let mut payload = CheckResponse::new();
        payload.add_upstream_header("x-authenticated-subject", "alice");
        payload.remove_upstream_header("authorization");
        payload.remove_upstream_header("cookie");

        let response = envoy_response(CheckOutcome {
            decision: Decision::Allow,
            response: payload,
            chain: Some("secure".to_string()),
        });

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-authenticated-subject"], "alice");
        assert_eq!(response.headers()[HEADERS_TO_REMOVE], "authorization,cookie");
    }

    #[test]
    fn test_envoy_response_denied() {
        let mut payload = CheckResponse::new();
        payload
            .deny(401, "unauthenticated")
            .headers
            .push(CheckHeader::new("www-authenticate", "Bearer realm=\"x\""));

        let response = envoy_response(CheckOutcome {
            decision: Decision::Allow,
            response: payload,
            chain: None,
        });

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()["www-authenticate"], "Bearer realm=\"x\"");
    }

    #[test]
    fn test_envoy_response_errors() {
        let invalid = envoy_response(CheckOutcome {
            decision: Decision::InvalidArgument,
            response: CheckResponse::new(),
            chain: None,
        });
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let internal = envoy_response(CheckOutcome::internal(None));
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_reply_shape() {
        let reply = CheckReply::from_decision(Decision::InvalidArgument, None);
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["status"]["code"], 3);
        assert_eq!(json["status"]["message"], "invalid request");
        assert!(json.get("http_response").is_none());
    }
}
