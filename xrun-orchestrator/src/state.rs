// SPDX-License-Identifier: Apache-2.0

//! The run's supervision state machine (spec §4.2 "State machine").

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Launching,
    Running,
    Draining,
    Terminating,
    Done,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Launching => "launching",
            RunState::Running => "running",
            RunState::Draining => "draining",
            RunState::Terminating => "terminating",
            RunState::Done => "done",
        }
    }
}

/// Tracks the current state and logs every transition under the run's
/// tracing span, matching the teacher's habit of logging state machine
/// edges rather than modeling them as a separate crate.
pub struct StateTracker {
    current: RunState,
}

impl StateTracker {
    pub fn new() -> Self {
        StateTracker {
            current: RunState::Launching,
        }
    }

    pub fn current(&self) -> RunState {
        self.current
    }

    pub fn transition(&mut self, next: RunState) {
        tracing::debug!(from = self.current.as_str(), to = next.as_str(), "state transition");
        self.current = next;
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}
