//! Inbound query value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One user query. Immutable once built; lives for a single request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub received_at: DateTime<Utc>,
    /// Conversation id; forwarded to agents as the A2A `contextId`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), received_at: Utc::now(), session_id: None }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        let id = session_id.into();
        self.session_id = (!id.trim().is_empty()).then_some(id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_session_is_dropped() {
        let q = Query::new("hi").with_session("  ");
        assert!(q.session_id.is_none());
        let q = Query::new("hi").with_session("abc");
        assert_eq!(q.session_id.as_deref(), Some("abc"));
    }
}
