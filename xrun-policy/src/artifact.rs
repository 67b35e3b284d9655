// SPDX-License-Identifier: Apache-2.0

//! Artifact commit tracking shared by both policies (spec §4.3 "Artifact
//! commit semantics"). A commit event moves an artifact from in-flight to
//! committed; anything still in-flight at `close()` is an orphan.

use std::collections::HashMap;
use std::sync::Mutex;
use xrun_core::ContractViolation;

#[derive(Debug, Default)]
struct ArtifactState {
    byte_sum: u64,
    chunk_count: u32,
    committed: bool,
}

#[derive(Default)]
pub struct ArtifactTracker {
    state: Mutex<HashMap<String, ArtifactState>>,
}

impl ArtifactTracker {
    pub fn new() -> Self {
        ArtifactTracker::default()
    }

    /// Records a chunk for `artifact_id`. Returns `false` if the artifact
    /// was already committed, meaning the chunk is stray and must be
    /// discarded by the caller.
    pub fn record_chunk(&self, artifact_id: &str, size: u64) -> bool {
        let mut state = self.state.lock().unwrap();
        let entry = state.entry(artifact_id.to_string()).or_default();
        if entry.committed {
            return false;
        }
        entry.byte_sum += size;
        entry.chunk_count += 1;
        true
    }

    pub fn is_committed(&self, artifact_id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .get(artifact_id)
            .map(|s| s.committed)
            .unwrap_or(false)
    }

    /// Marks `artifact_id` committed. Returns `Err` when the declared size
    /// disagrees with the chunk byte sum observed so far; the caller still
    /// persists the commit event (the mismatch is reported, not fatal).
    pub fn record_commit(
        &self,
        artifact_id: &str,
        declared_size: u64,
    ) -> Result<(), ContractViolation> {
        let mut state = self.state.lock().unwrap();
        let entry = state.entry(artifact_id.to_string()).or_default();
        entry.committed = true;
        if entry.byte_sum != declared_size {
            return Err(ContractViolation::ChunkCommitSizeMismatch {
                artifact_id: artifact_id.to_string(),
                declared: declared_size,
                actual: entry.byte_sum,
            });
        }
        Ok(())
    }

    /// Artifact ids that received at least one chunk but were never
    /// committed — reported as orphans in the run outcome.
    pub fn orphans(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| !s.committed)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_with_matching_sum_succeeds() {
        let tracker = ArtifactTracker::new();
        tracker.record_chunk("art-1", 4);
        tracker.record_chunk("art-1", 6);
        assert!(tracker.record_commit("art-1", 10).is_ok());
        assert!(tracker.orphans().is_empty());
    }

    #[test]
    fn commit_with_mismatched_sum_reports_violation_but_still_commits() {
        let tracker = ArtifactTracker::new();
        tracker.record_chunk("art-1", 4);
        let err = tracker.record_commit("art-1", 10).unwrap_err();
        assert!(matches!(
            err,
            ContractViolation::ChunkCommitSizeMismatch { declared: 10, actual: 4, .. }
        ));
        assert!(tracker.is_committed("art-1"));
    }

    #[test]
    fn chunk_after_commit_is_rejected() {
        let tracker = ArtifactTracker::new();
        tracker.record_commit("art-1", 0).unwrap();
        assert!(!tracker.record_chunk("art-1", 4));
    }

    #[test]
    fn uncommitted_artifact_is_an_orphan() {
        let tracker = ArtifactTracker::new();
        tracker.record_chunk("art-1", 4);
        tracker.record_chunk("art-2", 4);
        tracker.record_commit("art-2", 4).unwrap();
        assert_eq!(tracker.orphans(), vec!["art-1".to_string()]);
    }
}
