// SPDX-License-Identifier: Apache-2.0

//! A minimal filesystem-backed `StorageSink` (spec §6 "storage backend
//! selector"). The physical layout is opaque per spec §3; this is the
//! simplest backend that satisfies the trait, analogous to the teacher's
//! `file://` telemetry endpoint used in local testing.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use xrun_core::{ChunkRecord, EventEnvelope, StorageSink};

pub struct FsStorageSink {
    root: PathBuf,
}

/// Joins `key` onto `root` one component at a time, rejecting anything that
/// could escape `root` — a `..` component, an absolute prefix, or a bare
/// root. `key` and `artifact_id` both ultimately derive from child-supplied
/// frame fields (`FileWriteFrame::filename`, `ArtifactChunkFrame::artifact_id`
/// via the run_id/filename key built in `run.rs`), so they're untrusted.
fn safe_join(root: &Path, key: &str) -> anyhow::Result<PathBuf> {
    let mut joined = root.to_path_buf();
    for component in Path::new(key).components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => {}
            other => anyhow::bail!("storage key `{key}` contains a disallowed path component: {other:?}"),
        }
    }
    Ok(joined)
}

/// Validates an identifier that must name exactly one directory segment
/// (no separators, no `..`).
fn sanitize_segment(segment: &str) -> anyhow::Result<&str> {
    let mut components = Path::new(segment).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(segment),
        _ => anyhow::bail!("invalid identifier `{segment}`: must be a single path segment"),
    }
}

impl FsStorageSink {
    /// Fails fast if the root cannot be created (spec §4.1 "Failure to
    /// configure storage must fail fast — never silently discard").
    pub async fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(FsStorageSink { root })
    }
}

#[async_trait]
impl StorageSink for FsStorageSink {
    async fn write_events(&self, records: &[EventEnvelope]) -> anyhow::Result<()> {
        let path = self.root.join("events.ndjson");
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        for record in records {
            let mut line = serde_json::to_vec(record)?;
            line.push(b'\n');
            file.write_all(&line).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn write_chunks(&self, artifact_id: &str, chunks: &[ChunkRecord]) -> anyhow::Result<()> {
        let artifact_id = sanitize_segment(artifact_id)?;
        let dir = self.root.join("artifacts").join(artifact_id);
        fs::create_dir_all(&dir).await?;
        for chunk in chunks {
            let path = dir.join(format!("{:010}.bin", chunk.seq));
            fs::write(&path, &chunk.data).await?;
        }
        Ok(())
    }

    async fn put_file(&self, key: &str, _content_type: &str, bytes: &[u8]) -> anyhow::Result<String> {
        let path = safe_join(&self.root.join("files"), key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        Ok(path.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use xrun_core::EventPayload;

    fn envelope() -> EventEnvelope {
        EventEnvelope {
            contract_version: xrun_core::CONTRACT_VERSION.to_string(),
            event_id: "evt-1".into(),
            run_id: "run-1".into(),
            sequence: 1,
            timestamp: chrono::Utc::now(),
            attempt: 1,
            job_id: None,
            parent_run_id: None,
            payload: EventPayload::Checkpoint { label: None, progress: None },
        }
    }

    #[tokio::test]
    async fn write_events_appends_ndjson_lines() {
        let dir = tempdir().unwrap();
        let sink = FsStorageSink::new(dir.path()).await.unwrap();
        sink.write_events(&[envelope(), envelope()]).await.unwrap();
        let contents = tokio::fs::read_to_string(dir.path().join("events.ndjson")).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn put_file_writes_under_files_dir() {
        let dir = tempdir().unwrap();
        let sink = FsStorageSink::new(dir.path()).await.unwrap();
        let path = sink.put_file("out.json", "application/json", b"{}").await.unwrap();
        assert!(tokio::fs::metadata(&path).await.is_ok());
        assert!(PathBuf::from(&path).starts_with(dir.path()));
    }

    #[tokio::test]
    async fn put_file_rejects_parent_dir_traversal() {
        let dir = tempdir().unwrap();
        let sink = FsStorageSink::new(dir.path()).await.unwrap();
        let result = sink.put_file("../../etc/passwd", "text/plain", b"x").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn put_file_rejects_absolute_path_key() {
        let dir = tempdir().unwrap();
        let sink = FsStorageSink::new(dir.path()).await.unwrap();
        let result = sink.put_file("/etc/passwd", "text/plain", b"x").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn write_chunks_rejects_traversal_in_artifact_id() {
        let dir = tempdir().unwrap();
        let sink = FsStorageSink::new(dir.path()).await.unwrap();
        let chunk = ChunkRecord {
            seq: 0,
            is_last: true,
            data: b"x".to_vec(),
        };
        let result = sink.write_chunks("../escape", std::slice::from_ref(&chunk)).await;
        assert!(result.is_err());
    }
}
