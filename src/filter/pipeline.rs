//! Ordered filter pipeline.

use async_trait::async_trait;
use tracing::debug;

use crate::check::{CheckRequest, CheckResponse, Code};

use super::Filter;

/// Runs filters in order until one reports something other than `Ok`.
///
/// This is the per-request processor a chain hands to the dispatcher.
#[derive(Default)]
pub struct Pipeline {
    filters: Vec<Box<dyn Filter>>,
}

impl Pipeline {
    pub fn new(filters: Vec<Box<dyn Filter>>) -> Self {
        Self { filters }
    }

    /// Append a filter.
    pub fn push(&mut self, filter: Box<dyn Filter>) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

#[async_trait]
impl Filter for Pipeline {
    async fn process(&mut self, request: &CheckRequest, response: &mut CheckResponse) -> Code {
        for filter in self.filters.iter_mut() {
            let code = filter.process(request, response).await;
            if code != Code::Ok {
                debug!(filter = filter.name(), code = %code, "filter ended pipeline");
                return code;
            }
        }
        Code::Ok
    }

    fn name(&self) -> &'static str {
        "pipeline"
    }
}
