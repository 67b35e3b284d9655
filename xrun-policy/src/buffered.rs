// SPDX-License-Identifier: Apache-2.0

//! The buffered ingestion policy: a bounded in-memory queue drained by a
//! background writer task (spec §4.3). The writer is a mailbox loop
//! modeled on the teacher's `ddtelemetry::worker::TelemetryWorker::run`,
//! adapted to `tokio::sync::mpsc` and async storage writes.

use crate::artifact::ArtifactTracker;
use crate::{IngestionPolicy, SubmitOutcome};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use xrun_core::{ArtifactChunkFrame, ChunkRecord, EventEnvelope, EventPayload, PolicyError, StorageSink};
use xrun_metrics::PolicyStats;

/// Ordering guarantee the background writer applies to deferred artifact
/// commit events (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Writer retries failed writes; on shutdown it drains the queue to
    /// completion rather than abandoning buffered work.
    AtLeastOnce,
    /// Artifact chunks are written ahead of their own commit event. The
    /// writer's strict FIFO order already guarantees this, since chunks
    /// are always emitted before the commit they belong to.
    ChunksFirst,
    /// No commit event for any artifact is written until every chunk for
    /// every artifact currently queued has been written.
    TwoPhase,
}

enum Item {
    Event(EventEnvelope),
    Chunk(ArtifactChunkFrame),
}

const WRITE_RETRY_ATTEMPTS: u32 = 3;
const WRITE_RETRY_DELAY: std::time::Duration = std::time::Duration::from_millis(10);

pub struct BufferedPolicy<S> {
    tx: Mutex<Option<mpsc::UnboundedSender<Item>>>,
    join: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<Mutex<PolicyStats>>,
    artifacts: Arc<ArtifactTracker>,
    max_events: u64,
    max_bytes: u64,
    queued_count: Arc<AtomicU64>,
    _storage_marker: std::marker::PhantomData<S>,
}

impl<S: StorageSink + 'static> BufferedPolicy<S> {
    /// `max_events`/`max_bytes`: at least one must be positive (spec
    /// §4.3 "sized by max_events and/or max_bytes").
    pub fn new(
        storage: Arc<S>,
        max_events: u64,
        max_bytes: u64,
        flush_mode: FlushMode,
    ) -> Result<Self, PolicyError> {
        if max_events == 0 && max_bytes == 0 {
            return Err(PolicyError::Misconfigured(
                "buffered policy requires max_events or max_bytes to be positive".into(),
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(Mutex::new(PolicyStats::default()));
        let artifacts = Arc::new(ArtifactTracker::new());
        let queued_count = Arc::new(AtomicU64::new(0));

        let join = tokio::spawn(run_writer(
            rx,
            storage,
            stats.clone(),
            artifacts.clone(),
            queued_count.clone(),
            flush_mode,
        ));

        Ok(BufferedPolicy {
            tx: Mutex::new(Some(tx)),
            join: Mutex::new(Some(join)),
            stats,
            artifacts,
            max_events,
            max_bytes,
            queued_count,
            _storage_marker: std::marker::PhantomData,
        })
    }

    fn would_exceed_bounds(&self, incoming_bytes: u64) -> bool {
        let over_events =
            self.max_events > 0 && self.queued_count.load(Ordering::Relaxed) >= self.max_events;
        let over_bytes = self.max_bytes > 0 && {
            let stats = self.stats.lock().unwrap();
            stats.buffered_bytes + incoming_bytes > self.max_bytes
        };
        over_events || over_bytes
    }

    fn enqueue(&self, item: Item, size: u64) -> Option<()> {
        let guard = self.tx.lock().unwrap();
        let tx = guard.as_ref()?;
        tx.send(item).ok()?;
        self.queued_count.fetch_add(1, Ordering::Relaxed);
        self.stats.lock().unwrap().buffered_bytes += size;
        Some(())
    }
}

fn estimate_event_bytes(envelope: &EventEnvelope) -> u64 {
    rmp_serde::to_vec_named(envelope)
        .map(|bytes| bytes.len() as u64)
        .unwrap_or(0)
}

#[async_trait]
impl<S: StorageSink + 'static> IngestionPolicy for BufferedPolicy<S> {
    async fn submit_event(&self, envelope: EventEnvelope) -> Result<SubmitOutcome, PolicyError> {
        let size = estimate_event_bytes(&envelope);
        let event_type = envelope.event_type();

        // Terminal events preempt buffer limits and are never dropped
        // (spec §4.3).
        if envelope.is_terminal() {
            return match self.enqueue(Item::Event(envelope), size) {
                Some(()) => Ok(SubmitOutcome::Persisted),
                None => Ok(SubmitOutcome::Dropped),
            };
        }

        if self.would_exceed_bounds(size) {
            self.stats.lock().unwrap().record_drop(event_type);
            return Ok(SubmitOutcome::Dropped);
        }

        match self.enqueue(Item::Event(envelope), size) {
            Some(()) => Ok(SubmitOutcome::Persisted),
            None => {
                self.stats.lock().unwrap().record_drop(event_type);
                Ok(SubmitOutcome::Dropped)
            }
        }
    }

    async fn submit_chunk(
        &self,
        chunk: ArtifactChunkFrame,
    ) -> Result<SubmitOutcome, PolicyError> {
        let size = chunk.data.len() as u64;
        if self.would_exceed_bounds(size) {
            return Ok(SubmitOutcome::Dropped);
        }
        match self.enqueue(Item::Chunk(chunk), size) {
            Some(()) => Ok(SubmitOutcome::Persisted),
            None => Ok(SubmitOutcome::Dropped),
        }
    }

    async fn close(&self) -> PolicyStats {
        // Dropping the sender lets the writer drain whatever is already
        // queued; `recv()` keeps yielding buffered items before it
        // finally returns `None`.
        self.tx.lock().unwrap().take();
        let handle = self.join.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.stats.lock().unwrap().clone()
    }

    fn orphan_artifacts(&self) -> Vec<String> {
        self.artifacts.orphans()
    }

    fn name(&self) -> &'static str {
        "buffered"
    }
}

async fn write_event_with_retry<S: StorageSink>(
    storage: &S,
    envelope: &EventEnvelope,
    flush_mode: FlushMode,
) -> anyhow::Result<()> {
    let attempts = if flush_mode == FlushMode::AtLeastOnce {
        WRITE_RETRY_ATTEMPTS
    } else {
        1
    };
    let mut last_err = None;
    for attempt in 0..attempts {
        match storage.write_events(std::slice::from_ref(envelope)).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                tracing::warn!(attempt, error = %err, "buffered event write failed");
                last_err = Some(err);
                if attempt + 1 < attempts {
                    tokio::time::sleep(WRITE_RETRY_DELAY).await;
                }
            }
        }
    }
    Err(last_err.unwrap())
}

async fn write_chunk_with_retry<S: StorageSink>(
    storage: &S,
    chunk: &ArtifactChunkFrame,
    flush_mode: FlushMode,
) -> anyhow::Result<()> {
    let record = ChunkRecord {
        seq: chunk.seq,
        is_last: chunk.is_last,
        data: chunk.data.clone(),
    };
    let attempts = if flush_mode == FlushMode::AtLeastOnce {
        WRITE_RETRY_ATTEMPTS
    } else {
        1
    };
    let mut last_err = None;
    for attempt in 0..attempts {
        match storage
            .write_chunks(&chunk.artifact_id, std::slice::from_ref(&record))
            .await
        {
            Ok(()) => return Ok(()),
            Err(err) => {
                tracing::warn!(attempt, error = %err, "buffered chunk write failed");
                last_err = Some(err);
                if attempt + 1 < attempts {
                    tokio::time::sleep(WRITE_RETRY_DELAY).await;
                }
            }
        }
    }
    Err(last_err.unwrap())
}

/// Drains the queue in order. Under `TwoPhase`, artifact commit events are
/// held back until every chunk ahead of them has been written, then
/// flushed at the next terminal event (or at final drain if none arrives).
async fn run_writer<S: StorageSink>(
    mut rx: mpsc::UnboundedReceiver<Item>,
    storage: Arc<S>,
    stats: Arc<Mutex<PolicyStats>>,
    artifacts: Arc<ArtifactTracker>,
    queued_count: Arc<AtomicU64>,
    flush_mode: FlushMode,
) {
    let mut pending_commits: Vec<EventEnvelope> = Vec::new();

    while let Some(item) = rx.recv().await {
        queued_count.fetch_sub(1, Ordering::Relaxed);

        match item {
            Item::Chunk(chunk) => {
                let size = chunk.data.len() as u64;
                {
                    let mut s = stats.lock().unwrap();
                    s.buffered_bytes = s.buffered_bytes.saturating_sub(size);
                }

                if artifacts.is_committed(&chunk.artifact_id) {
                    tracing::warn!(artifact_id = %chunk.artifact_id, "stray chunk discarded");
                    continue;
                }
                match write_chunk_with_retry(storage.as_ref(), &chunk, flush_mode).await {
                    Ok(()) => {
                        artifacts.record_chunk(&chunk.artifact_id, size);
                        stats.lock().unwrap().chunk_count += 1;
                    }
                    Err(err) => {
                        tracing::error!(artifact_id = %chunk.artifact_id, error = %err, "dropping chunk after exhausting retries");
                    }
                }
            }
            Item::Event(envelope) => {
                let size = estimate_event_bytes(&envelope);
                {
                    let mut s = stats.lock().unwrap();
                    s.buffered_bytes = s.buffered_bytes.saturating_sub(size);
                    s.total_events += 1;
                }

                if let EventPayload::Artifact {
                    artifact_id,
                    size_bytes,
                    ..
                } = &envelope.payload
                {
                    if let Err(violation) = artifacts.record_commit(artifact_id, *size_bytes) {
                        tracing::warn!(%violation, artifact_id = %artifact_id, "artifact commit size mismatch");
                    }
                }

                let is_terminal = envelope.is_terminal();
                let is_commit = matches!(envelope.payload, EventPayload::Artifact { .. });

                if is_commit && flush_mode == FlushMode::TwoPhase {
                    pending_commits.push(envelope);
                } else {
                    flush_event(storage.as_ref(), &stats, &envelope, flush_mode).await;
                }

                if is_terminal {
                    for commit in pending_commits.drain(..) {
                        flush_event(storage.as_ref(), &stats, &commit, flush_mode).await;
                    }
                }
            }
        }
    }

    for commit in pending_commits.drain(..) {
        flush_event(storage.as_ref(), &stats, &commit, flush_mode).await;
    }
}

async fn flush_event<S: StorageSink>(
    storage: &S,
    stats: &Arc<Mutex<PolicyStats>>,
    envelope: &EventEnvelope,
    flush_mode: FlushMode,
) {
    match write_event_with_retry(storage, envelope, flush_mode).await {
        Ok(()) => {
            let mut s = stats.lock().unwrap();
            s.persisted_events += 1;
            s.flush_count += 1;
        }
        Err(err) => {
            tracing::error!(event_id = %envelope.event_id, error = %err, "dropping event after exhausting retries");
            stats.lock().unwrap().record_drop(envelope.event_type());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingStorage {
        events: StdMutex<Vec<EventEnvelope>>,
        chunks: StdMutex<Vec<(String, ChunkRecord)>>,
    }

    #[async_trait]
    impl StorageSink for RecordingStorage {
        async fn write_events(&self, records: &[EventEnvelope]) -> anyhow::Result<()> {
            self.events.lock().unwrap().extend_from_slice(records);
            Ok(())
        }

        async fn write_chunks(&self, artifact_id: &str, chunks: &[ChunkRecord]) -> anyhow::Result<()> {
            let mut guard = self.chunks.lock().unwrap();
            for chunk in chunks {
                guard.push((artifact_id.to_string(), chunk.clone()));
            }
            Ok(())
        }

        async fn put_file(&self, key: &str, _content_type: &str, _bytes: &[u8]) -> anyhow::Result<String> {
            Ok(key.to_string())
        }
    }

    fn envelope(seq: u64, payload: EventPayload) -> EventEnvelope {
        EventEnvelope {
            contract_version: xrun_core::CONTRACT_VERSION.to_string(),
            event_id: format!("evt-{seq}"),
            run_id: "run-1".into(),
            sequence: seq,
            timestamp: chrono::Utc::now(),
            attempt: 1,
            job_id: None,
            parent_run_id: None,
            payload,
        }
    }

    #[tokio::test]
    async fn rejects_construction_with_no_positive_bound() {
        let storage = Arc::new(RecordingStorage::default());
        let err = BufferedPolicy::new(storage, 0, 0, FlushMode::AtLeastOnce).unwrap_err();
        assert!(matches!(err, PolicyError::Misconfigured(_)));
    }

    #[tokio::test]
    async fn events_flush_in_order_and_stats_reflect_them() {
        let storage = Arc::new(RecordingStorage::default());
        let policy = BufferedPolicy::new(storage.clone(), 100, 1_000_000, FlushMode::AtLeastOnce).unwrap();
        for seq in 0..5 {
            policy
                .submit_event(envelope(seq, EventPayload::Checkpoint { label: None, progress: None }))
                .await
                .unwrap();
        }
        let stats = policy.close().await;
        assert_eq!(stats.total_events, 5);
        assert_eq!(stats.persisted_events, 5);
        let persisted = storage.events.lock().unwrap();
        let sequences: Vec<u64> = persisted.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn exceeding_max_events_drops_and_counts_by_type() {
        let storage = Arc::new(RecordingStorage::default());
        let policy = BufferedPolicy::new(storage, 1, 1_000_000, FlushMode::AtLeastOnce).unwrap();
        policy
            .submit_event(envelope(0, EventPayload::Checkpoint { label: None, progress: None }))
            .await
            .unwrap();
        // The queue already holds one item (max_events=1); before the
        // writer drains it, a second submission must be dropped.
        let outcome = policy
            .submit_event(envelope(1, EventPayload::Checkpoint { label: None, progress: None }))
            .await
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::Dropped);
        let stats = policy.close().await;
        assert_eq!(stats.dropped_by_type.get("checkpoint"), Some(&1));
    }

    #[tokio::test]
    async fn terminal_event_is_never_dropped_even_over_bound() {
        let storage = Arc::new(RecordingStorage::default());
        let policy = BufferedPolicy::new(storage.clone(), 1, 1_000_000, FlushMode::AtLeastOnce).unwrap();
        policy
            .submit_event(envelope(0, EventPayload::Checkpoint { label: None, progress: None }))
            .await
            .unwrap();
        let outcome = policy
            .submit_event(envelope(1, EventPayload::RunComplete { summary: None }))
            .await
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::Persisted);
        let stats = policy.close().await;
        assert_eq!(stats.persisted_events, 2);
    }

    #[tokio::test]
    async fn two_phase_defers_commit_until_terminal() {
        let storage = Arc::new(RecordingStorage::default());
        let policy = BufferedPolicy::new(storage.clone(), 100, 1_000_000, FlushMode::TwoPhase).unwrap();
        policy
            .submit_chunk(ArtifactChunkFrame::new("art-1", 0, true, b"hello".to_vec()))
            .await
            .unwrap();
        policy
            .submit_event(envelope(
                1,
                EventPayload::Artifact {
                    artifact_id: "art-1".into(),
                    name: "out.json".into(),
                    mime_type: "application/json".into(),
                    size_bytes: 5,
                },
            ))
            .await
            .unwrap();
        policy
            .submit_event(envelope(2, EventPayload::RunComplete { summary: None }))
            .await
            .unwrap();
        let stats = policy.close().await;
        assert_eq!(stats.chunk_count, 1);
        assert_eq!(stats.persisted_events, 2);
        assert!(policy.orphan_artifacts().is_empty());
    }
}
