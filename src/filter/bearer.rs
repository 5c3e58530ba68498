//! Static bearer token validation.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::check::{CheckRequest, CheckResponse, Code, HeaderValue};
use crate::config::BearerConfig;

use super::Filter;

/// Result of inspecting the credential header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authentication {
    /// No credential header
    Missing,
    /// Credential header present but unusable
    Malformed(&'static str),
    /// Well-formed credential that matches no configured token
    UnknownToken,
    /// Known token whose subject is not allowed through
    Forbidden(String),
    /// Known and allowed subject
    Authenticated(String),
}

/// Validates `<scheme> <token>` credentials against a token table.
///
/// Built once per chain and shared by every processor of that chain.
pub struct BearerValidator {
    header: String,
    scheme: String,
    challenge: String,
    tokens: HashMap<String, Arc<str>>,
    allowed_subjects: HashSet<String>,
    subject_header: String,
    strip_header: bool,
}

impl BearerValidator {
    pub fn new(config: &BearerConfig) -> Self {
        let tokens = config
            .tokens
            .iter()
            .map(|t| (t.token.clone(), Arc::from(t.subject.as_str())))
            .collect();

        Self {
            header: config.header.to_ascii_lowercase(),
            scheme: config.scheme.clone(),
            challenge: format!("{} realm=\"{}\"", config.scheme, config.realm),
            tokens,
            allowed_subjects: config.allowed_subjects.iter().cloned().collect(),
            subject_header: config.subject_header.clone(),
            strip_header: config.strip_header,
        }
    }

    /// Header carrying the credential.
    pub fn header(&self) -> &str {
        &self.header
    }

    /// Inspect the request's credential.
    pub fn authenticate(&self, request: &CheckRequest) -> Authentication {
        let Some(value) = request.header(&self.header) else {
            return Authentication::Missing;
        };

        let mut parts = value.split_whitespace();
        let (scheme, token) = match (parts.next(), parts.next(), parts.next()) {
            (Some(scheme), Some(token), None) => (scheme, token),
            (None, _, _) => return Authentication::Malformed("empty credential"),
            (Some(_), None, _) => return Authentication::Malformed("missing token"),
            (Some(_), Some(_), Some(_)) => {
                return Authentication::Malformed("unexpected credential fields")
            }
        };

        if !scheme.eq_ignore_ascii_case(&self.scheme) {
            return Authentication::Malformed("unsupported authorization scheme");
        }

        match self.tokens.get(token) {
            None => Authentication::UnknownToken,
            Some(subject) if self.is_allowed(subject) => {
                Authentication::Authenticated(subject.to_string())
            }
            Some(subject) => Authentication::Forbidden(subject.to_string()),
        }
    }

    fn is_allowed(&self, subject: &str) -> bool {
        self.allowed_subjects.is_empty() || self.allowed_subjects.contains(subject)
    }

    /// Write the response for `auth` and return the matching code.
    pub fn respond(&self, auth: &Authentication, response: &mut CheckResponse) -> Code {
        match auth {
            Authentication::Authenticated(subject) => {
                self.admit(subject, response);
                Code::Ok
            }
            Authentication::Missing => {
                response
                    .deny(401, "unauthenticated")
                    .headers
                    .push(HeaderValue::new("www-authenticate", self.challenge.clone()));
                Code::Unauthenticated
            }
            Authentication::UnknownToken => {
                response.deny(401, "unauthenticated").headers.push(HeaderValue::new(
                    "www-authenticate",
                    format!("{}, error=\"invalid_token\"", self.challenge),
                ));
                Code::Unauthenticated
            }
            Authentication::Forbidden(subject) => {
                debug!(subject = %subject, "subject not allowed");
                response.deny(403, "forbidden");
                Code::PermissionDenied
            }
            Authentication::Malformed(reason) => {
                debug!(header = %self.header, reason, "malformed credential");
                Code::InvalidArgument
            }
        }
    }

    /// Apply the upstream mutations for an authenticated subject.
    pub fn admit(&self, subject: &str, response: &mut CheckResponse) {
        response.add_upstream_header(self.subject_header.clone(), subject);
        if self.strip_header {
            response.remove_upstream_header(self.header.clone());
        }
    }
}

impl fmt::Debug for BearerValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerValidator")
            .field("header", &self.header)
            .field("scheme", &self.scheme)
            .field("tokens", &self.tokens.len())
            .field("allowed_subjects", &self.allowed_subjects)
            .field("subject_header", &self.subject_header)
            .field("strip_header", &self.strip_header)
            .finish()
    }
}

/// Filter authenticating every request by its bearer token.
#[derive(Debug, Clone)]
pub struct BearerFilter {
    validator: Arc<BearerValidator>,
}

impl BearerFilter {
    pub fn new(validator: Arc<BearerValidator>) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl Filter for BearerFilter {
    async fn process(&mut self, request: &CheckRequest, response: &mut CheckResponse) -> Code {
        let auth = self.validator.authenticate(request);
        self.validator.respond(&auth, response)
    }

    fn name(&self) -> &'static str {
        "bearer"
    }
}
