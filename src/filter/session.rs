//! Cookie session filter.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::check::{CheckRequest, CheckResponse, Code};
use crate::session::{Session, SessionStore};

use super::bearer::{Authentication, BearerValidator};
use super::Filter;

/// Chain-scoped session settings.
#[derive(Debug)]
pub struct SessionPolicy {
    pub cookie_name: String,
    /// Cookie `Max-Age`
    pub max_age: Duration,
    /// Credentials accepted to start a session
    pub validator: BearerValidator,
}

impl SessionPolicy {
    fn set_cookie(&self, session_id: &str) -> String {
        format!(
            "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
            self.cookie_name,
            session_id,
            self.max_age.as_secs()
        )
    }
}

/// Admits requests carrying a live session cookie, and starts a session for
/// requests carrying valid credentials.
pub struct SessionFilter {
    policy: Arc<SessionPolicy>,
    store: Arc<dyn SessionStore>,
}

impl SessionFilter {
    pub fn new(policy: Arc<SessionPolicy>, store: Arc<dyn SessionStore>) -> Self {
        Self { policy, store }
    }
}

#[async_trait]
impl Filter for SessionFilter {
    async fn process(&mut self, request: &CheckRequest, response: &mut CheckResponse) -> Code {
        if let Some(id) = request.cookie(&self.policy.cookie_name) {
            if let Some(session) = self.store.get(id) {
                self.policy.validator.admit(&session.subject, response);
                return Code::Ok;
            }
            debug!(cookie = %self.policy.cookie_name, "unknown or expired session");
        }

        match self.policy.validator.authenticate(request) {
            Authentication::Authenticated(subject) => {
                let session = Session::new(subject);
                debug!(subject = %session.subject, "session created");

                self.policy.validator.admit(&session.subject, response);
                response.add_response_header("set-cookie", self.policy.set_cookie(&session.id));
                self.store.set(session);
                Code::Ok
            }
            auth => self.policy.validator.respond(&auth, response),
        }
    }

    fn name(&self) -> &'static str {
        "session"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BearerConfig, TokenConfig};
    use crate::session::InMemorySessionStore;

    fn policy() -> Arc<SessionPolicy> {
        let credentials = BearerConfig {
            tokens: vec![TokenConfig {
                token: "s3cr3t".to_string(),
                subject: "alice".to_string(),
            }],
            ..Default::default()
        };
        Arc::new(SessionPolicy {
            cookie_name: "sid".to_string(),
            max_age: Duration::from_secs(3600),
            validator: BearerValidator::new(&credentials),
        })
    }

    fn store() -> Arc<InMemorySessionStore> {
        Arc::new(InMemorySessionStore::new(
            Duration::from_secs(3600),
            Duration::from_secs(600),
        ))
    }

    fn request() -> CheckRequest {
        CheckRequest::new("GET", "https", "example.com", "/secure")
    }

    #[tokio::test]
    async fn test_credentials_start_session() {
        let store = store();
        let mut filter = SessionFilter::new(policy(), store.clone());
        let mut response = CheckResponse::new();

        let code = filter
            .process(
                &request().with_header("authorization", "Bearer s3cr3t"),
                &mut response,
            )
            .await;

        assert_eq!(code, Code::Ok);
        assert_eq!(store.len(), 1);
        assert_eq!(response.upstream_header("x-authenticated-subject"), Some("alice"));

        let ok = response.ok_response().unwrap();
        let cookie = &ok.response_headers_to_add[0];
        assert_eq!(cookie.key, "set-cookie");
        assert!(cookie.value.starts_with("sid="));
        assert!(cookie.value.contains("HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=3600"));
    }

    #[tokio::test]
    async fn test_cookie_resumes_session() {
        let store = store();
        let session = Session::new("alice");
        let id = session.id.clone();
        store.set(session);

        let mut filter = SessionFilter::new(policy(), store.clone());
        let mut response = CheckResponse::new();
        let code = filter
            .process(
                &request().with_header("cookie", format!("theme=dark; sid={id}")),
                &mut response,
            )
            .await;

        assert_eq!(code, Code::Ok);
        assert_eq!(response.upstream_header("x-authenticated-subject"), Some("alice"));
        assert!(response.ok_response().unwrap().response_headers_to_add.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_cookie_falls_back_to_credentials() {
        let store = store();
        let mut filter = SessionFilter::new(policy(), store.clone());
        let mut response = CheckResponse::new();

        let code = filter
            .process(
                &request()
                    .with_header("cookie", "sid=gone")
                    .with_header("authorization", "Bearer s3cr3t"),
                &mut response,
            )
            .await;

        assert_eq!(code, Code::Ok);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_no_cookie_no_credentials() {
        let mut filter = SessionFilter::new(policy(), store());
        let mut response = CheckResponse::new();

        let code = filter.process(&request(), &mut response).await;

        assert_eq!(code, Code::Unauthenticated);
        assert_eq!(response.denied_response().unwrap().status, 401);
    }

    #[tokio::test]
    async fn test_malformed_credentials() {
        let mut filter = SessionFilter::new(policy(), store());
        let mut response = CheckResponse::new();

        let code = filter
            .process(
                &request().with_header("authorization", "Bearer"),
                &mut response,
            )
            .await;

        assert_eq!(code, Code::InvalidArgument);
    }
}
