// SPDX-License-Identifier: Apache-2.0

//! Outcome classification (spec §4.2 "Outcome classification", §7
//! "Taxonomy"). Pulled out as a pure function of observed signals so every
//! combination is unit-testable without spinning up a child process.

use xrun_core::OutcomeStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalKind {
    RunComplete,
    RunError,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OutcomeSignals {
    pub terminal: Option<TerminalKind>,
    pub child_exit_code: Option<i32>,
    pub version_mismatch: bool,
    pub policy_failure: bool,
    pub cancelled: bool,
}

/// Priority, highest first: a version mismatch or a strict-policy storage
/// failure is a harder contract failure than whatever the child's exit
/// code or terminal event says, so it wins regardless of the rest.
pub fn classify(signals: OutcomeSignals) -> OutcomeStatus {
    if signals.version_mismatch {
        return OutcomeStatus::VersionMismatch;
    }
    if signals.policy_failure {
        return OutcomeStatus::PolicyFailure;
    }
    match signals.terminal {
        Some(TerminalKind::RunError) => OutcomeStatus::ScriptError,
        Some(TerminalKind::RunComplete) => {
            if signals.child_exit_code == Some(0) {
                OutcomeStatus::Completed
            } else {
                // Terminal observed but the child still exited abnormally;
                // the exit code is the more trustworthy signal here.
                OutcomeStatus::ExecutorCrash
            }
        }
        None => match signals.child_exit_code {
            Some(1) => OutcomeStatus::ScriptError,
            // No terminal event at all: crash, clean exit, or
            // cancellation are all `executor_crash` (spec §7e, §7f) — the
            // child is required to emit a terminal event.
            _ => OutcomeStatus::ExecutorCrash,
        },
    }
}
