// SPDX-License-Identifier: Apache-2.0

//! End-to-end scenarios from spec §8, driven against a real child process
//! (`fake_child`, a fixture binary built alongside this crate) instead of
//! mocking any part of `RunOrchestrator::execute`.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use xrun_core::{ChunkRecord, EventEnvelope, OutcomeStatus, RunIdentity, StorageSink};
use xrun_metrics::MetricsCollector;
use xrun_orchestrator::{LaunchSpec, RunConfig, RunOrchestrator};
use xrun_policy::{BufferedPolicy, FlushMode, IngestionPolicy, StrictPolicy};

fn fake_child_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_fake_child"))
}

/// Writes a throwaway "script" file whose contents name the scenario
/// `fake_child` should play back. `script_path` only needs to exist (spec
/// §4.2 step 1); its content is not otherwise interpreted by the real
/// orchestrator.
fn scenario_script(name: &str) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!(
        "xrun-e2e-{}-{}-{}.scenario",
        std::process::id(),
        n,
        name
    ));
    std::fs::write(&path, name).unwrap();
    path
}

fn launch_spec(run_id: &str, scenario: &str) -> LaunchSpec {
    LaunchSpec {
        identity: RunIdentity::new(run_id),
        script_path: scenario_script(scenario),
        executor_bundle: Vec::new(),
        executor_override: Some(fake_child_path()),
        job: serde_json::json!({}),
        proxy: None,
        storage: None,
        browser_ws_endpoint: None,
    }
}

#[derive(Default)]
struct RecordingStorage {
    events: Mutex<Vec<EventEnvelope>>,
    chunks: Mutex<Vec<(String, ChunkRecord)>>,
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

/// A storage sink that sleeps on every event write, so a burst of
/// submissions outruns the buffered policy's writer and forces drops
/// (spec §8 scenario 5).
#[derive(Default)]
struct SlowStorage {
    events: Mutex<Vec<EventEnvelope>>,
    delay: Duration,
}

#[async_trait]
impl StorageSink for SlowStorage {
    async fn write_events(&self, records: &[EventEnvelope]) -> anyhow::Result<()> {
        tokio::time::sleep(self.delay).await;
        self.events.lock().unwrap().extend_from_slice(records);
        Ok(())
    }

    async fn write_chunks(&self, _artifact_id: &str, _chunks: &[ChunkRecord]) -> anyhow::Result<()> {
        Ok(())
    }

    async fn put_file(&self, key: &str, _content_type: &str, _bytes: &[u8]) -> anyhow::Result<String> {
        Ok(key.to_string())
    }
}

async fn run(
    scenario: &str,
    policy: Arc<dyn IngestionPolicy>,
    storage: Arc<dyn StorageSink>,
    metrics: &MetricsCollector,
) -> xrun_core::Outcome {
    let orchestrator = RunOrchestrator::new(RunConfig::default());
    let spec = launch_spec(&format!("run-{scenario}"), scenario);
    orchestrator
        .execute(spec, policy, storage, None, metrics, CancellationToken::new())
        .await
        .expect("orchestrator execute should not error at the API boundary")
}

#[tokio::test]
async fn scenario_1_happy_path_strict() {
    let storage = Arc::new(RecordingStorage::default());
    let policy: Arc<dyn IngestionPolicy> = Arc::new(StrictPolicy::new(storage.clone()));
    let metrics = MetricsCollector::new();
    let outcome = run("happy_path", policy, storage.clone(), &metrics).await;

    assert_eq!(outcome.status, OutcomeStatus::Completed);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(outcome.events_persisted, 3);
    assert_eq!(storage.events.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn scenario_2_artifact_commit() {
    let storage = Arc::new(RecordingStorage::default());
    let policy: Arc<dyn IngestionPolicy> = Arc::new(StrictPolicy::new(storage.clone()));
    let metrics = MetricsCollector::new();
    let outcome = run("artifact_commit", policy, storage.clone(), &metrics).await;

    assert_eq!(outcome.status, OutcomeStatus::Completed);
    assert_eq!(outcome.events_persisted, 2);
    assert!(outcome.orphan_artifact_ids.is_empty());
    assert_eq!(storage.chunks.lock().unwrap().len(), 2);
    let total_bytes: usize = storage
        .chunks
        .lock()
        .unwrap()
        .iter()
        .map(|(_, c)| c.data.len())
        .sum();
    assert_eq!(total_bytes, 8);
}

#[tokio::test]
async fn scenario_3_script_error() {
    let storage = Arc::new(RecordingStorage::default());
    let policy: Arc<dyn IngestionPolicy> = Arc::new(StrictPolicy::new(storage.clone()));
    let metrics = MetricsCollector::new();
    let outcome = run("script_error", policy, storage.clone(), &metrics).await;

    assert_eq!(outcome.status, OutcomeStatus::ScriptError);
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(outcome.events_persisted, 2);
}

#[tokio::test]
async fn scenario_4_crash_without_terminal() {
    let storage = Arc::new(RecordingStorage::default());
    let policy: Arc<dyn IngestionPolicy> = Arc::new(StrictPolicy::new(storage.clone()));
    let metrics = MetricsCollector::new();
    let outcome = run("crash_no_terminal", policy, storage.clone(), &metrics).await;

    assert_eq!(outcome.status, OutcomeStatus::ExecutorCrash);
    assert_eq!(outcome.exit_code(), 2);
    assert_eq!(outcome.events_persisted, 1);
}

#[tokio::test]
async fn scenario_5_buffered_overflow_with_drops() {
    let storage = Arc::new(SlowStorage {
        events: Mutex::new(Vec::new()),
        delay: Duration::from_millis(80),
    });
    let policy: Arc<dyn IngestionPolicy> =
        Arc::new(BufferedPolicy::new(storage.clone(), 3, 0, FlushMode::AtLeastOnce).unwrap());
    let metrics = MetricsCollector::new();
    let outcome = run("buffered_overflow", policy, storage.clone(), &metrics).await;

    assert_eq!(outcome.status, OutcomeStatus::Completed);
    assert!(outcome.events_dropped >= 1, "expected at least one dropped item");
    assert_eq!(
        outcome.dropped_by_type.get("item").copied().unwrap_or(0),
        outcome.events_dropped,
        "every drop in this scenario is an item drop"
    );
    // The terminal event always persists even though the buffer was full.
    assert!(storage
        .events
        .lock()
        .unwrap()
        .iter()
        .any(|e| e.is_terminal()));
}

#[tokio::test]
async fn scenario_6_version_mismatch() {
    let storage = Arc::new(RecordingStorage::default());
    let policy: Arc<dyn IngestionPolicy> = Arc::new(StrictPolicy::new(storage.clone()));
    let metrics = MetricsCollector::new();
    let outcome = run("version_mismatch", policy, storage.clone(), &metrics).await;

    assert_eq!(outcome.status, OutcomeStatus::VersionMismatch);
    assert_eq!(outcome.exit_code(), 3);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.outcomes.run_failed, 1);
    assert_eq!(snapshot.outcomes.executor_crash, 0);
}
