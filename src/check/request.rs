//! Authorization check request.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Network peer of the original request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Peer {
    /// Peer address (`ip:port`)
    #[serde(default)]
    pub address: String,
}

/// Attributes of the original HTTP request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request id assigned by the proxy
    #[serde(default)]
    pub id: String,
    /// HTTP method
    #[serde(default)]
    pub method: String,
    /// Request headers (names are matched case-insensitively)
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request target (`/path?query#fragment`)
    #[serde(default)]
    pub path: String,
    /// Host or authority
    #[serde(default)]
    pub host: String,
    /// URL scheme
    #[serde(default)]
    pub scheme: String,
    /// HTTP protocol version
    #[serde(default)]
    pub protocol: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestAttributes {
    #[serde(default)]
    pub http: HttpRequest,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttributeContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Peer>,
    #[serde(default)]
    pub request: RequestAttributes,
}

/// A single authorization check, one per proxied request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckRequest {
    #[serde(default)]
    pub attributes: AttributeContext,
}

impl CheckRequest {
    /// Create a request from the main HTTP attributes.
    pub fn new(
        method: impl Into<String>,
        scheme: impl Into<String>,
        host: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            attributes: AttributeContext {
                source: None,
                request: RequestAttributes {
                    http: HttpRequest {
                        method: method.into(),
                        scheme: scheme.into(),
                        host: host.into(),
                        path: path.into(),
                        ..Default::default()
                    },
                },
            },
        }
    }

    /// Set a header. Names are stored lowercase.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.attributes
            .request
            .http
            .headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Set the request id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.attributes.request.http.id = id.into();
        self
    }

    /// Set the HTTP protocol.
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.attributes.request.http.protocol = protocol.into();
        self
    }

    /// Set the peer address.
    pub fn with_source(mut self, address: impl Into<String>) -> Self {
        self.attributes.source = Some(Peer {
            address: address.into(),
        });
        self
    }

    /// The HTTP attributes.
    pub fn http(&self) -> &HttpRequest {
        &self.attributes.request.http
    }

    /// Look up a header value.
    ///
    /// Pseudo-headers (`:path`, `:authority`, `:method`, `:scheme`) fall back
    /// to the corresponding request attribute when the proxy did not copy
    /// them into the header map.
    pub fn header(&self, name: &str) -> Option<&str> {
        let http = self.http();

        let found = http
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str());

        if found.is_some() {
            return found;
        }

        let attribute = match name {
            ":path" => &http.path,
            ":authority" => &http.host,
            ":method" => &http.method,
            ":scheme" => &http.scheme,
            _ => return None,
        };

        if attribute.is_empty() {
            None
        } else {
            Some(attribute.as_str())
        }
    }

    /// Value of a cookie sent with the request.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        let header = self.header("cookie")?;
        header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.trim_matches('"'))
    }
}
