// SPDX-License-Identifier: Apache-2.0

//! The storage interface consumed by the ingestion policies (spec §6
//! "Storage interface"). The physical layout is opaque and out of scope;
//! this crate only depends on the trait seam.

use crate::events::EventEnvelope;
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub seq: u32,
    pub is_last: bool,
    pub data: Vec<u8>,
}

/// Append-only event sink. Implementations must fail fast on
/// misconfiguration rather than silently discarding writes (spec §4.1).
#[async_trait]
pub trait StorageSink: Send + Sync {
    async fn write_events(&self, records: &[EventEnvelope]) -> anyhow::Result<()>;

    async fn write_chunks(&self, artifact_id: &str, chunks: &[ChunkRecord]) -> anyhow::Result<()>;

    async fn put_file(
        &self,
        key: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> anyhow::Result<String>;
}
