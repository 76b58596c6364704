//! Scripted analyzer: returns a fixed judgment, optionally after a delay.
//! Substitutes the hosted model in tests and offline runs.

use std::time::Duration;

use crate::analysis::{AnalysisJudgment, AnalysisRequest};
use crate::error::AnalysisError;

#[derive(Debug, Clone)]
pub struct ScriptedAnalyzer {
    outcome: Result<AnalysisJudgment, AnalysisError>,
    delay: Option<Duration>,
}

impl Default for ScriptedAnalyzer {
    fn default() -> Self {
        Self::judging(AnalysisJudgment::clean())
    }
}

impl ScriptedAnalyzer {
    pub fn judging(judgment: AnalysisJudgment) -> Self {
        Self { outcome: Ok(judgment), delay: None }
    }

    /// Every call fails with a request error.
    pub fn failing() -> Self {
        Self {
            outcome: Err(AnalysisError::Request("scripted failure".into())),
            delay: None,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn analyze(&self, _request: &AnalysisRequest<'_>) -> Result<AnalysisJudgment, AnalysisError> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        self.outcome.clone()
    }
}
