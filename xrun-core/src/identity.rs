// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// Identity of a single invocation, propagated on every persisted event and
/// every log line for correlation (spec §3 "Run identity").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    pub run_id: String,
    #[serde(default = "default_attempt")]
    pub attempt: u32,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub parent_run_id: Option<String>,
}

fn default_attempt() -> u32 {
    1
}

impl RunIdentity {
    pub fn new(run_id: impl Into<String>) -> Self {
        RunIdentity {
            run_id: run_id.into(),
            attempt: 1,
            job_id: None,
            parent_run_id: None,
        }
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_parent_run_id(mut self, parent_run_id: impl Into<String>) -> Self {
        self.parent_run_id = Some(parent_run_id.into());
        self
    }

    /// A tracing span field set, reused by every logger in the orchestrator.
    pub fn span_fields(&self) -> tracing::Span {
        tracing::info_span!(
            "run",
            run_id = %self.run_id,
            attempt = self.attempt,
            job_id = self.job_id.as_deref().unwrap_or(""),
            parent_run_id = self.parent_run_id.as_deref().unwrap_or(""),
        )
    }
}
