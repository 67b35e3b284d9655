// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// Terminal classification of a run (spec §4.2 "Outcome classification").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Completed,
    ScriptError,
    ExecutorCrash,
    PolicyFailure,
    VersionMismatch,
}

impl OutcomeStatus {
    /// Exit code mapped to the parent CLI (spec §4.2, §6).
    pub fn exit_code(self) -> i32 {
        match self {
            OutcomeStatus::Completed => 0,
            OutcomeStatus::ScriptError => 1,
            OutcomeStatus::ExecutorCrash => 2,
            OutcomeStatus::PolicyFailure => 3,
            OutcomeStatus::VersionMismatch => 3,
        }
    }
}

/// The structured summary returned by the orchestrator and printed by the
/// CLI (spec §7 "User-visible failure").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub run_id: String,
    pub attempt: u32,
    pub status: OutcomeStatus,
    pub message: Option<String>,
    pub duration_ms: u64,
    pub policy_name: String,
    pub events_persisted: u64,
    pub events_dropped: u64,
    pub dropped_by_type: std::collections::BTreeMap<String, u64>,
    pub buffered_bytes: u64,
    pub orphan_artifact_ids: Vec<String>,
    pub stderr_output: String,
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_mapping_matches_spec() {
        assert_eq!(OutcomeStatus::Completed.exit_code(), 0);
        assert_eq!(OutcomeStatus::ScriptError.exit_code(), 1);
        assert_eq!(OutcomeStatus::ExecutorCrash.exit_code(), 2);
        assert_eq!(OutcomeStatus::PolicyFailure.exit_code(), 3);
        assert_eq!(OutcomeStatus::VersionMismatch.exit_code(), 3);
    }
}
