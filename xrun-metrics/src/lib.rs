// SPDX-License-Identifier: Apache-2.0

//! The per-run metrics collector (spec §3 "Policy stats", §4.3 "Stats
//! absorbed into metrics"). Internally mutex-synchronized so every
//! increment is atomic with respect to reads (spec §5 "Shared resources").

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Add;
use std::sync::Mutex;
use xrun_core::{EventType, OutcomeStatus};

/// Counters returned verbatim by an ingestion policy's `close()` (spec
/// §4.3). The orchestrator absorbs these into the collector unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyStats {
    pub total_events: u64,
    pub persisted_events: u64,
    pub dropped_events: u64,
    pub dropped_by_type: BTreeMap<String, u64>,
    pub chunk_count: u64,
    pub flush_count: u64,
    pub buffered_bytes: u64,
    /// Frames discarded for arriving after the run's terminal event — a
    /// contract violation (spec §7 taxonomy (c)), kept separate from
    /// `dropped_by_type` because it is never a capacity/backpressure drop.
    pub frame_after_terminal_count: u64,
}

impl PolicyStats {
    pub fn record_drop(&mut self, event_type: EventType) {
        self.dropped_events += 1;
        *self
            .dropped_by_type
            .entry(event_type.as_str().to_string())
            .or_insert(0) += 1;
    }
}

impl Add for PolicyStats {
    type Output = PolicyStats;

    fn add(self, rhs: Self) -> Self::Output {
        let mut dropped_by_type = self.dropped_by_type;
        for (k, v) in rhs.dropped_by_type {
            *dropped_by_type.entry(k).or_insert(0) += v;
        }
        PolicyStats {
            total_events: self.total_events + rhs.total_events,
            persisted_events: self.persisted_events + rhs.persisted_events,
            dropped_events: self.dropped_events + rhs.dropped_events,
            dropped_by_type,
            chunk_count: self.chunk_count + rhs.chunk_count,
            flush_count: self.flush_count + rhs.flush_count,
            buffered_bytes: self.buffered_bytes + rhs.buffered_bytes,
            frame_after_terminal_count: self.frame_after_terminal_count + rhs.frame_after_terminal_count,
        }
    }
}

/// Frame-decode failure counts (spec §4.1 "Counts are surfaced as
/// metrics").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecodeFailureStats {
    pub bad_msgpack_count: u64,
    pub unknown_type_count: u64,
    pub partial_frame: bool,
    pub too_large: bool,
}

/// Contract-violation counts (spec §7 taxonomy (c)): detected, logged, and
/// counted the same way decode failures are, but kept in their own bucket
/// since a contract violation is a well-formed frame that breaks a protocol
/// invariant rather than a frame that failed to decode at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractViolationStats {
    pub non_monotonic_sequence_count: u64,
    pub frame_after_terminal_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutcomeCounters {
    pub run_completed: u64,
    pub run_failed: u64,
    pub executor_crash: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub policy: PolicyStats,
    pub decode_failures: DecodeFailureStats,
    pub contract_violations: ContractViolationStats,
    pub outcomes: OutcomeCounters,
    pub record_kind: &'static str,
}

#[derive(Default)]
struct Inner {
    policy: PolicyStats,
    decode_failures: DecodeFailureStats,
    contract_violations: ContractViolationStats,
    outcomes: OutcomeCounters,
}

pub struct MetricsCollector {
    inner: Mutex<Inner>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        MetricsCollector {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorbs a policy's `close()` stats verbatim (spec §4.3), folding its
    /// frame-after-terminal count into the collector's own contract-violation
    /// bucket alongside the orchestrator-level non-monotonic-sequence count.
    pub fn absorb_policy_stats(&self, stats: PolicyStats) {
        let mut inner = self.inner.lock().unwrap();
        inner.contract_violations.frame_after_terminal_count += stats.frame_after_terminal_count;
        inner.policy = stats;
    }

    pub fn record_non_monotonic_sequence(&self) {
        self.inner.lock().unwrap().contract_violations.non_monotonic_sequence_count += 1;
    }

    pub fn record_bad_msgpack(&self) {
        self.inner.lock().unwrap().decode_failures.bad_msgpack_count += 1;
    }

    pub fn record_unknown_type(&self) {
        self.inner.lock().unwrap().decode_failures.unknown_type_count += 1;
    }

    pub fn mark_partial_frame(&self) {
        self.inner.lock().unwrap().decode_failures.partial_frame = true;
    }

    pub fn mark_too_large(&self) {
        self.inner.lock().unwrap().decode_failures.too_large = true;
    }

    /// Classifies the outcome into the counters named by spec §4.2/§7:
    /// a version mismatch increments `run_failed`, never `executor_crash`.
    pub fn record_outcome(&self, status: OutcomeStatus) {
        let mut inner = self.inner.lock().unwrap();
        match status {
            OutcomeStatus::Completed => inner.outcomes.run_completed += 1,
            OutcomeStatus::ExecutorCrash => inner.outcomes.executor_crash += 1,
            OutcomeStatus::VersionMismatch | OutcomeStatus::ScriptError | OutcomeStatus::PolicyFailure => {
                inner.outcomes.run_failed += 1;
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.lock().unwrap();
        MetricsSnapshot {
            policy: inner.policy.clone(),
            decode_failures: inner.decode_failures.clone(),
            contract_violations: inner.contract_violations.clone(),
            outcomes: inner.outcomes.clone(),
            record_kind: "metrics",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_mismatch_increments_run_failed_not_executor_crash() {
        let m = MetricsCollector::new();
        m.record_outcome(OutcomeStatus::VersionMismatch);
        let snap = m.snapshot();
        assert_eq!(snap.outcomes.run_failed, 1);
        assert_eq!(snap.outcomes.executor_crash, 0);
    }

    #[test]
    fn policy_stats_are_absorbed_verbatim() {
        let m = MetricsCollector::new();
        let mut stats = PolicyStats::default();
        stats.record_drop(EventType::Item);
        stats.total_events = 10;
        m.absorb_policy_stats(stats.clone());
        let snap = m.snapshot();
        assert_eq!(snap.policy.total_events, 10);
        assert_eq!(snap.policy.dropped_by_type.get("item"), Some(&1));
    }

    #[test]
    fn contract_violations_are_counted() {
        let m = MetricsCollector::new();
        m.record_non_monotonic_sequence();
        m.record_non_monotonic_sequence();
        let mut stats = PolicyStats::default();
        stats.frame_after_terminal_count = 1;
        m.absorb_policy_stats(stats);
        let snap = m.snapshot();
        assert_eq!(snap.contract_violations.non_monotonic_sequence_count, 2);
        assert_eq!(snap.contract_violations.frame_after_terminal_count, 1);
    }

    #[test]
    fn policy_stats_add_merges_dropped_by_type() {
        let mut a = PolicyStats::default();
        a.record_drop(EventType::Item);
        let mut b = PolicyStats::default();
        b.record_drop(EventType::Item);
        b.record_drop(EventType::Log);
        let merged = a + b;
        assert_eq!(merged.dropped_by_type.get("item"), Some(&2));
        assert_eq!(merged.dropped_by_type.get("log"), Some(&1));
        assert_eq!(merged.dropped_events, 3);
    }
}
