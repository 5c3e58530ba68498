use async_trait::async_trait;

use crate::check::{CheckRequest, CheckResponse, Code};

use super::Filter;

/// Filter that lets every request through unmodified.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughFilter;

#[async_trait]
impl Filter for PassthroughFilter {
    async fn process(&mut self, _request: &CheckRequest, _response: &mut CheckResponse) -> Code {
        Code::Ok
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }
}
