// SPDX-License-Identifier: Apache-2.0

//! Post-run notification adapters (spec §6 "Adapter interface") — webhook,
//! pub/sub, etc. No implementation ships here; this crate owns only the
//! event shape and the trait seam.

use crate::outcome::OutcomeStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCompletedEvent {
    pub run_id: String,
    pub source: String,
    pub category: String,
    pub day_partition: String,
    pub outcome: OutcomeStatus,
    pub storage_path: String,
    pub timestamp: DateTime<Utc>,
    pub attempt: u32,
    pub event_count: u64,
    pub duration_ms: u64,
}

#[async_trait]
pub trait RunCompletionAdapter: Send + Sync {
    async fn publish(&self, event: &RunCompletedEvent) -> anyhow::Result<()>;
}
