// SPDX-License-Identifier: Apache-2.0

//! The run orchestrator (spec §4.2): owns the child-process lifecycle end
//! to end, routing decoded frames to the ingestion policy and the
//! file-write sidecar, and classifying the terminal outcome.

use crate::bundle::BundleCache;
use crate::classify::{classify, OutcomeSignals, TerminalKind};
use crate::config::RunConfig;
use crate::launch::{metadata_line, resolve_executor_path, spawn_child, LaunchSpec};
use crate::state::{RunState, StateTracker};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use xrun_core::{
    ContractViolation, EventPayload, FileWriteAckFrame, Outcome, OutcomeStatus, RunCompletionAdapter, StorageSink,
};
use xrun_ipc::{decode_frame, write_frame, write_metadata_line, FrameReader, WireFrame};
use xrun_metrics::MetricsCollector;
use xrun_policy::IngestionPolicy;

pub struct RunOrchestrator {
    config: RunConfig,
}

impl RunOrchestrator {
    pub fn new(config: RunConfig) -> Self {
        RunOrchestrator { config }
    }

    pub async fn execute(
        &self,
        spec: LaunchSpec,
        policy: Arc<dyn IngestionPolicy>,
        storage: Arc<dyn StorageSink>,
        adapter: Option<Arc<dyn RunCompletionAdapter>>,
        metrics: &MetricsCollector,
        cancel: CancellationToken,
    ) -> anyhow::Result<Outcome> {
        let _span = spec.identity.span_fields().entered();
        spec.validate()?;

        let started_at = Instant::now();
        let mut state = StateTracker::new();

        let cache = BundleCache::new(&self.config.bundle_cache_dir);
        let executor_path = resolve_executor_path(&spec, &cache)?;
        let mut child = spawn_child(&executor_path, &spec)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("child stdout was not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("child stderr was not piped"))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("child stdin was not piped"))?;

        let metadata = metadata_line(&spec)?;
        write_metadata_line(&mut stdin, &metadata.0).await?;

        state.transition(RunState::Running);

        let (ack_tx, mut ack_rx) = mpsc::unbounded_channel::<FileWriteAckFrame>();
        let ack_cancel = cancel.clone();
        let ack_writer = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = ack_cancel.cancelled() => break,
                    received = ack_rx.recv() => {
                        match received {
                            Some(ack) => {
                                match xrun_ipc::encode_frame(&ack) {
                                    Ok(frame) => {
                                        if let Err(err) = write_frame(&mut stdin, &frame).await {
                                            tracing::warn!(error = %err, "failed to write file_write_ack, stdin likely closed");
                                            break;
                                        }
                                    }
                                    Err(err) => tracing::error!(error = %err, "failed to encode file_write_ack"),
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
        });

        let stderr_limit = self.config.stderr_capture_limit;
        let stderr_task = tokio::spawn(async move {
            let mut captured = String::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if captured.len() < stderr_limit {
                    captured.push_str(&line);
                    captured.push('\n');
                }
            }
            captured
        });

        let mut reader = FrameReader::with_max_payload(stdout, self.config.max_payload_size);
        let mut signals = OutcomeSignals::default();
        let mut next_seq: u64 = 1;
        let mut message: Option<String> = None;

        'frames: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    signals.cancelled = true;
                    break 'frames;
                }
                raw = reader.read_raw() => {
                    let raw = match raw {
                        Ok(Some(bytes)) => bytes,
                        Ok(None) => break 'frames,
                        Err(err) => {
                            tracing::error!(error = %err, "fatal frame decode error");
                            if matches!(err, xrun_core::DecodeError::PartialFrame) {
                                metrics.mark_partial_frame();
                            } else {
                                metrics.mark_too_large();
                            }
                            break 'frames;
                        }
                    };

                    match decode_frame(&raw) {
                        Ok(WireFrame::Event(envelope)) => {
                            if envelope.contract_version != xrun_core::CONTRACT_VERSION {
                                message = Some(xrun_core::version::mismatch_message(&envelope.contract_version));
                                tracing::error!(message = message.as_deref().unwrap_or(""), "version mismatch");
                                signals.version_mismatch = true;
                                break 'frames;
                            }

                            if envelope.sequence != next_seq {
                                tracing::warn!(
                                    expected = next_seq,
                                    got = envelope.sequence,
                                    "non-monotonic sequence, contract violation"
                                );
                                metrics.record_non_monotonic_sequence();
                            }
                            next_seq = envelope.sequence + 1;

                            let is_terminal = envelope.is_terminal();
                            if is_terminal {
                                signals.terminal = Some(match &envelope.payload {
                                    EventPayload::RunComplete { .. } => TerminalKind::RunComplete,
                                    _ => TerminalKind::RunError,
                                });
                                if let EventPayload::RunError { error_type, message: msg, .. } = &envelope.payload {
                                    message = Some(format!("{error_type}: {msg}"));
                                }
                            }

                            if let Err(err) = policy.submit_event(envelope).await {
                                tracing::error!(error = %err, "strict policy storage failure");
                                message = Some(err.to_string());
                                signals.policy_failure = true;
                                break 'frames;
                            }

                            if is_terminal {
                                break 'frames;
                            }
                        }
                        Ok(WireFrame::ArtifactChunk(chunk)) => {
                            if let Err(err) = policy.submit_chunk(chunk).await {
                                tracing::error!(error = %err, "policy chunk write failure");
                                message = Some(err.to_string());
                                signals.policy_failure = true;
                                break 'frames;
                            }
                        }
                        Ok(WireFrame::FileWrite(write)) => {
                            let key = format!("{}/{}", spec.identity.run_id, write.filename);
                            let ack = match storage.put_file(&key, &write.mime_type, &write.data).await {
                                Ok(_) => FileWriteAckFrame::ok(write.write_id),
                                Err(err) => {
                                    tracing::error!(error = %err, write_id = write.write_id, "sidecar file write failed");
                                    FileWriteAckFrame::err(write.write_id, err.to_string())
                                }
                            };
                            let _ = ack_tx.send(ack);
                        }
                        Ok(WireFrame::RunResult(result)) => {
                            if let Some(terminal) = signals.terminal {
                                let agrees = matches!(
                                    (terminal, result.status.as_str()),
                                    (TerminalKind::RunComplete, "completed" | "ok")
                                        | (TerminalKind::RunError, "error" | "failed")
                                );
                                if !agrees {
                                    tracing::warn!(
                                        terminal = ?terminal,
                                        result_status = %result.status,
                                        "run_result disagrees with the observed terminal event"
                                    );
                                }
                            }
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "recoverable decode error");
                            match &err {
                                xrun_core::DecodeError::BadMsgpack(_) => metrics.record_bad_msgpack(),
                                xrun_core::DecodeError::UnknownType(_) => metrics.record_unknown_type(),
                                _ => {}
                            }
                        }
                    }
                }
            }
        }

        state.transition(RunState::Draining);
        drop(ack_tx);
        let _ = ack_writer.await;
        let stderr_output = stderr_task.await.unwrap_or_default();

        let policy_stats = match tokio::time::timeout(self.config.policy_flush_timeout, policy.close()).await {
            Ok(stats) => stats,
            Err(_) => {
                tracing::error!("policy flush timed out");
                signals.policy_failure = true;
                xrun_metrics::PolicyStats::default()
            }
        };
        metrics.absorb_policy_stats(policy_stats.clone());
        let orphan_artifact_ids = policy.orphan_artifacts();

        state.transition(RunState::Terminating);
        let exit_status = if signals.cancelled {
            match tokio::time::timeout(self.config.termination_grace_period, child.wait()).await {
                Ok(status) => status.ok(),
                Err(_) => {
                    tracing::warn!("child did not exit within the grace period, forcing kill");
                    let _ = child.start_kill();
                    child.wait().await.ok()
                }
            }
        } else {
            child.wait().await.ok()
        };
        signals.child_exit_code = exit_status.and_then(|s| s.code());

        let status = classify(signals);
        metrics.record_outcome(status);

        if message.is_none() {
            message = match status {
                OutcomeStatus::ExecutorCrash => Some(match signals.child_exit_code {
                    Some(code) => format!("child exited with code {code} without a terminal event"),
                    None => "child exited without a terminal event".to_string(),
                }),
                _ => None,
            };
        }

        let outcome = Outcome {
            run_id: spec.identity.run_id.clone(),
            attempt: spec.identity.attempt,
            status,
            message,
            duration_ms: started_at.elapsed().as_millis() as u64,
            policy_name: policy.name().to_string(),
            events_persisted: policy_stats.persisted_events,
            events_dropped: policy_stats.dropped_events,
            dropped_by_type: policy_stats.dropped_by_type,
            buffered_bytes: policy_stats.buffered_bytes,
            orphan_artifact_ids,
            stderr_output,
        };

        if let Some(adapter) = adapter {
            let event = xrun_core::adapter::RunCompletedEvent {
                run_id: outcome.run_id.clone(),
                source: "xrun".to_string(),
                category: "run_completed".to_string(),
                day_partition: chrono::Utc::now().format("%Y-%m-%d").to_string(),
                outcome: outcome.status,
                storage_path: String::new(),
                timestamp: chrono::Utc::now(),
                attempt: outcome.attempt,
                event_count: outcome.events_persisted,
                duration_ms: outcome.duration_ms,
            };
            if let Err(err) = adapter.publish(&event).await {
                tracing::error!(error = %err, "post-run adapter publish failed, not overriding outcome");
            }
        }

        state.transition(RunState::Done);
        Ok(outcome)
    }
}
