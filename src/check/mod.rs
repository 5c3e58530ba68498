//! Check request/response model.
//!
//! Wire-neutral representation of an external authorization call: the
//! attributes of the proxied HTTP request, the payload a pipeline builds,
//! the outcome code a pipeline reports and the decision returned to the
//! proxy.

mod code;
mod request;
mod response;

pub use code::{Code, Decision};
pub use request::{AttributeContext, CheckRequest, HttpRequest, Peer, RequestAttributes};
pub use response::{CheckResponse, DeniedHttpResponse, HeaderValue, HttpResponse, OkHttpResponse};

/// Result of dispatching one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    /// Decision returned to the proxy
    pub decision: Decision,
    /// Payload built by the pipeline (empty when no chain ran)
    pub response: CheckResponse,
    /// Name of the chain that processed the request, if any
    pub chain: Option<String>,
}

impl CheckOutcome {
    /// Allow without any processing.
    pub fn allow() -> Self {
        Self {
            decision: Decision::Allow,
            response: CheckResponse::default(),
            chain: None,
        }
    }

    /// Internal failure with no payload.
    pub fn internal(chain: Option<String>) -> Self {
        Self {
            decision: Decision::Internal,
            response: CheckResponse::default(),
            chain,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.decision == Decision::Allow
    }
}
