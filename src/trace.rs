use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct TraceStep {
    pub stage: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

/// Ordered record of the named stages a computation went through.
///
/// Returned alongside every metric value so a `None` result can always be
/// explained (no messages, empty category, unavailable store, ...).
#[derive(Debug, Clone, Default, Serialize)]
pub struct DebugTrace {
    pub steps: Vec<TraceStep>,
}

impl DebugTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: &str, data: Value) {
        debug!(target: "service_metrics::trace", stage, data = %data, "metrics stage");
        self.steps.push(TraceStep {
            stage: stage.to_string(),
            data,
            timestamp: Utc::now(),
        });
    }

    pub fn has_stage(&self, stage: &str) -> bool {
        self.steps.iter().any(|step| step.stage == stage)
    }

    pub fn find(&self, stage: &str) -> Option<&TraceStep> {
        self.steps.iter().find(|step| step.stage == stage)
    }

    pub fn last_stage(&self) -> Option<&str> {
        self.steps.last().map(|step| step.stage.as_str())
    }
}
