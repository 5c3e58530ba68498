//! Authorization check response payload built by the pipeline.

use serde::{Deserialize, Serialize};

/// A header name/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderValue {
    pub key: String,
    pub value: String,
}

impl HeaderValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Mutations applied when the proxy lets the request through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OkHttpResponse {
    /// Headers added to the upstream request
    #[serde(default)]
    pub headers: Vec<HeaderValue>,
    /// Headers removed from the upstream request
    #[serde(default)]
    pub headers_to_remove: Vec<String>,
    /// Headers added to the downstream response
    #[serde(default)]
    pub response_headers_to_add: Vec<HeaderValue>,
}

/// Response synthesized by the proxy instead of forwarding the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeniedHttpResponse {
    /// HTTP status code
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<HeaderValue>,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpResponse {
    OkResponse(OkHttpResponse),
    DeniedResponse(DeniedHttpResponse),
}

/// Payload attached to the check result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_response: Option<HttpResponse>,
}

impl CheckResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// The ok response, created if absent. A previously set denial is replaced.
    pub fn ok_response_mut(&mut self) -> &mut OkHttpResponse {
        if !matches!(self.http_response, Some(HttpResponse::OkResponse(_))) {
            self.http_response = Some(HttpResponse::OkResponse(OkHttpResponse::default()));
        }
        match self.http_response {
            Some(HttpResponse::OkResponse(ref mut ok)) => ok,
            _ => unreachable!("ok response was just set"),
        }
    }

    /// Add a header to the upstream request.
    pub fn add_upstream_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.ok_response_mut().headers.push(HeaderValue::new(key, value));
    }

    /// Strip a header from the upstream request.
    pub fn remove_upstream_header(&mut self, key: impl Into<String>) {
        self.ok_response_mut().headers_to_remove.push(key.into());
    }

    /// Add a header to the downstream response.
    pub fn add_response_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.ok_response_mut()
            .response_headers_to_add
            .push(HeaderValue::new(key, value));
    }

    /// Replace the payload with a denial.
    pub fn deny(&mut self, status: u16, body: impl Into<String>) -> &mut DeniedHttpResponse {
        self.http_response = Some(HttpResponse::DeniedResponse(DeniedHttpResponse {
            status,
            headers: Vec::new(),
            body: body.into(),
        }));
        match self.http_response {
            Some(HttpResponse::DeniedResponse(ref mut denied)) => denied,
            _ => unreachable!("denied response was just set"),
        }
    }

    pub fn ok_response(&self) -> Option<&OkHttpResponse> {
        match &self.http_response {
            Some(HttpResponse::OkResponse(ok)) => Some(ok),
            _ => None,
        }
    }

    pub fn denied_response(&self) -> Option<&DeniedHttpResponse> {
        match &self.http_response {
            Some(HttpResponse::DeniedResponse(denied)) => Some(denied),
            _ => None,
        }
    }

    pub fn is_denied(&self) -> bool {
        self.denied_response().is_some()
    }

    /// Value of an upstream header added by an earlier filter.
    pub fn upstream_header(&self, key: &str) -> Option<&str> {
        self.ok_response()?
            .headers
            .iter()
            .rev()
            .find(|h| h.key.eq_ignore_ascii_case(key))
            .map(|h| h.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_mutations() {
        let mut response = CheckResponse::new();
        response.add_upstream_header("x-user", "alice");
        response.remove_upstream_header("authorization");
        response.add_response_header("set-cookie", "s=1");

        let ok = response.ok_response().unwrap();
        assert_eq!(ok.headers, vec![HeaderValue::new("x-user", "alice")]);
        assert_eq!(ok.headers_to_remove, vec!["authorization".to_string()]);
        assert_eq!(ok.response_headers_to_add.len(), 1);
        assert_eq!(response.upstream_header("X-User"), Some("alice"));
        assert!(!response.is_denied());
    }

    #[test]
    fn test_deny_replaces_ok() {
        let mut response = CheckResponse::new();
        response.add_upstream_header("x-user", "alice");
        response
            .deny(401, "unauthenticated")
            .headers
            .push(HeaderValue::new("www-authenticate", "Bearer"));

        let denied = response.denied_response().unwrap();
        assert_eq!(denied.status, 401);
        assert_eq!(denied.body, "unauthenticated");
        assert_eq!(denied.headers.len(), 1);
        assert!(response.ok_response().is_none());
        assert_eq!(response.upstream_header("x-user"), None);
    }

    #[test]
    fn test_serialize_shape() {
        let mut response = CheckResponse::new();
        response.deny(403, "forbidden");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["http_response"]["denied_response"]["status"], 403);

        let empty = serde_json::to_value(CheckResponse::new()).unwrap();
        assert!(empty.get("http_response").is_none());
    }
}
