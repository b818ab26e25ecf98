use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use surge_common::ResponseView;

type Predicate = Arc<dyn Fn(&ResponseView) -> bool + Send + Sync>;

/// Named boolean predicate over a response. Each check's result is also recorded as its
/// own `checks{<name>}` rate.
#[derive(Clone)]
pub struct Check {
    name: String,
    predicate: Predicate,
}

impl Check {
    pub fn new(
        name: impl Into<String>,
        predicate: impl Fn(&ResponseView) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self { name: name.into(), predicate: Arc::new(predicate) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evaluate(&self, response: &ResponseView) -> bool {
        (self.predicate)(response)
    }

    pub fn status(expected: u16) -> Self {
        Self::new(format!("status is {expected}"), move |r| r.status == expected)
    }

    pub fn status_not(rejected: u16) -> Self {
        Self::new(format!("status is not {rejected}"), move |r| r.status != rejected)
    }

    pub fn status_in(name: impl Into<String>, allowed: &'static [u16]) -> Self {
        Self::new(name, move |r| allowed.contains(&r.status))
    }

    pub fn body_not_empty(name: impl Into<String>) -> Self {
        Self::new(name, |r| !r.body.is_empty())
    }

    pub fn has_json_field(name: impl Into<String>, field: &'static str) -> Self {
        Self::new(name, move |r| r.json_field(field).is_some())
    }

    pub fn json_field_equals(
        name: impl Into<String>,
        field: &'static str,
        expected: Value,
    ) -> Self {
        Self::new(name, move |r| r.json_field(field).as_ref() == Some(&expected))
    }

    pub fn latency_below(name: impl Into<String>, limit: Duration) -> Self {
        Self::new(name, move |r| r.duration < limit)
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check").field("name", &self.name).finish_non_exhaustive()
    }
}
