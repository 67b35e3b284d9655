// SPDX-License-Identifier: Apache-2.0

//! The strict ingestion policy: every event is written to storage
//! synchronously before `submit_event` returns, and no drops are ever
//! permitted (spec §4.3).

use crate::artifact::ArtifactTracker;
use crate::{IngestionPolicy, SubmitOutcome};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use xrun_core::{
    ArtifactChunkFrame, ChunkRecord, ContractViolation, EventEnvelope, EventPayload, PolicyError, StorageSink,
};
use xrun_metrics::PolicyStats;

pub struct StrictPolicy<S> {
    storage: Arc<S>,
    stats: Mutex<PolicyStats>,
    artifacts: ArtifactTracker,
    terminal_seen: AtomicBool,
}

impl<S: StorageSink> StrictPolicy<S> {
    pub fn new(storage: Arc<S>) -> Self {
        StrictPolicy {
            storage,
            stats: Mutex::new(PolicyStats::default()),
            artifacts: ArtifactTracker::new(),
            terminal_seen: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl<S: StorageSink> IngestionPolicy for StrictPolicy<S> {
    async fn submit_event(&self, envelope: EventEnvelope) -> Result<SubmitOutcome, PolicyError> {
        if self.terminal_seen.load(Ordering::SeqCst) {
            let violation = ContractViolation::FrameAfterTerminal;
            tracing::warn!(
                %violation,
                run_id = %envelope.run_id,
                sequence = envelope.sequence,
                "discarding"
            );
            self.stats.lock().unwrap().frame_after_terminal_count += 1;
            return Ok(SubmitOutcome::Dropped);
        }

        if let EventPayload::Artifact {
            artifact_id,
            size_bytes,
            ..
        } = &envelope.payload
        {
            if let Err(violation) = self.artifacts.record_commit(artifact_id, *size_bytes) {
                tracing::warn!(%violation, artifact_id = %artifact_id, "artifact commit size mismatch");
            }
        }

        let is_terminal = envelope.is_terminal();
        self.storage
            .write_events(std::slice::from_ref(&envelope))
            .await
            .map_err(PolicyError::StorageFailure)?;

        let mut stats = self.stats.lock().unwrap();
        stats.total_events += 1;
        stats.persisted_events += 1;
        drop(stats);

        if is_terminal {
            self.terminal_seen.store(true, Ordering::SeqCst);
        }
        Ok(SubmitOutcome::Persisted)
    }

    async fn submit_chunk(
        &self,
        chunk: ArtifactChunkFrame,
    ) -> Result<SubmitOutcome, PolicyError> {
        if self.artifacts.is_committed(&chunk.artifact_id) {
            tracing::warn!(
                artifact_id = %chunk.artifact_id,
                "chunk arrived after commit, discarding"
            );
            return Ok(SubmitOutcome::Dropped);
        }

        let record = ChunkRecord {
            seq: chunk.seq,
            is_last: chunk.is_last,
            data: chunk.data.clone(),
        };
        self.storage
            .write_chunks(&chunk.artifact_id, std::slice::from_ref(&record))
            .await
            .map_err(PolicyError::StorageFailure)?;
        self.artifacts
            .record_chunk(&chunk.artifact_id, chunk.data.len() as u64);

        let mut stats = self.stats.lock().unwrap();
        stats.chunk_count += 1;
        Ok(SubmitOutcome::Persisted)
    }

    async fn close(&self) -> PolicyStats {
        self.stats.lock().unwrap().clone()
    }

    fn orphan_artifacts(&self) -> Vec<String> {
        self.artifacts.orphans()
    }

    fn name(&self) -> &'static str {
        "strict"
    }
}
