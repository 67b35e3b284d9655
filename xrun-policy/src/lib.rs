// SPDX-License-Identifier: Apache-2.0

//! Ingestion policies: strict (synchronous, zero-drop) and buffered
//! (bounded queue, background writer) implementations of one
//! `IngestionPolicy` trait (spec §4.3).

mod artifact;
pub mod buffered;
pub mod strict;

pub use artifact::ArtifactTracker;
pub use buffered::{BufferedPolicy, FlushMode};
pub use strict::StrictPolicy;

use async_trait::async_trait;
use xrun_core::{ArtifactChunkFrame, EventEnvelope, PolicyError};
use xrun_metrics::PolicyStats;

/// Result of a single `submit_*` call. `Dropped` is only ever returned by
/// the buffered policy (spec §4.3 "No drops are ever permitted" for strict).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Persisted,
    Dropped,
}

#[async_trait]
pub trait IngestionPolicy: Send + Sync {
    async fn submit_event(&self, envelope: EventEnvelope) -> Result<SubmitOutcome, PolicyError>;

    async fn submit_chunk(
        &self,
        chunk: ArtifactChunkFrame,
    ) -> Result<SubmitOutcome, PolicyError>;

    /// Flushes any remaining buffered work and returns final stats (spec
    /// §4.3 "Stats absorbed into metrics"). Idempotent-by-contract: the
    /// orchestrator calls this exactly once per run.
    async fn close(&self) -> PolicyStats;

    /// Artifact ids that received chunks but were never committed.
    fn orphan_artifacts(&self) -> Vec<String>;

    fn name(&self) -> &'static str;
}
