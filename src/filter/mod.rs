//! Filters and filter chains.
//!
//! A filter is one unit of authorization logic. A chain groups filters
//! behind a request-matching predicate and creates a fresh pipeline of
//! filters (a processor) for every request it handles:
//! - Pass-through
//! - Bearer token (header-based)
//! - Cookie session backed by chain-scoped state

mod bearer;
mod chain;
mod passthrough;
mod pipeline;
mod session;

pub use bearer::{Authentication, BearerFilter, BearerValidator};
pub use chain::{ChainError, ChainMatcher, ConfiguredChain, FilterChain};
pub use passthrough::PassthroughFilter;
pub use pipeline::Pipeline;
pub use session::{SessionFilter, SessionPolicy};

use async_trait::async_trait;

use crate::check::{CheckRequest, CheckResponse, Code};

/// A unit of authorization logic.
///
/// Instances are created per request and never shared, so `process` takes
/// `&mut self` and may keep request-local state. Anything that must outlive
/// the request lives in chain-scoped state referenced through `Arc`.
///
/// Implementations report their result only through the returned [`Code`]
/// and the mutations they apply to `response`:
/// - `Ok`: the request may proceed
/// - `Unauthenticated` / `PermissionDenied`: handled correctly, the denial
///   has been written into `response`
/// - `InvalidArgument`: the request was malformed
/// - anything else: internal failure
#[async_trait]
pub trait Filter: Send {
    /// Process one request.
    async fn process(&mut self, request: &CheckRequest, response: &mut CheckResponse) -> Code;

    /// Filter name for logging.
    fn name(&self) -> &'static str;
}
