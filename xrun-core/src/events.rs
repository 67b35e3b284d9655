// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of event types a child may emit (spec §3 "Event types").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Item,
    Artifact,
    Checkpoint,
    Enqueue,
    RotateProxy,
    Log,
    RunComplete,
    RunError,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Item => "item",
            EventType::Artifact => "artifact",
            EventType::Checkpoint => "checkpoint",
            EventType::Enqueue => "enqueue",
            EventType::RotateProxy => "rotate_proxy",
            EventType::Log => "log",
            EventType::RunComplete => "run_complete",
            EventType::RunError => "run_error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EventType::RunComplete | EventType::RunError)
    }

    /// All members, used to pre-seed dropped-by-type maps so every type has
    /// an entry even when nothing of that type was ever dropped.
    pub const ALL: [EventType; 8] = [
        EventType::Item,
        EventType::Artifact,
        EventType::Checkpoint,
        EventType::Enqueue,
        EventType::RotateProxy,
        EventType::Log,
        EventType::RunComplete,
        EventType::RunError,
    ];
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Type-specific payload, tagged by the wire-level `type` field so a
/// msgpack map can be dispatched on that single field without decoding the
/// rest (the full decode still happens here; the zero-copy probe in
/// `xrun-ipc` is a separate, cheaper pre-pass over the raw bytes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Item {
        item_type: String,
        data: serde_json::Value,
    },
    Artifact {
        artifact_id: String,
        name: String,
        mime_type: String,
        size_bytes: u64,
    },
    Checkpoint {
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        progress: Option<f64>,
    },
    Enqueue {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        partition: Option<serde_json::Value>,
    },
    RotateProxy {
        #[serde(default)]
        reason: Option<String>,
    },
    Log {
        level: LogLevel,
        message: String,
        #[serde(default)]
        fields: Option<serde_json::Value>,
    },
    RunComplete {
        #[serde(default)]
        summary: Option<serde_json::Value>,
    },
    RunError {
        error_type: String,
        message: String,
        #[serde(default)]
        stack: Option<String>,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::Item { .. } => EventType::Item,
            EventPayload::Artifact { .. } => EventType::Artifact,
            EventPayload::Checkpoint { .. } => EventType::Checkpoint,
            EventPayload::Enqueue { .. } => EventType::Enqueue,
            EventPayload::RotateProxy { .. } => EventType::RotateProxy,
            EventPayload::Log { .. } => EventType::Log,
            EventPayload::RunComplete { .. } => EventType::RunComplete,
            EventPayload::RunError { .. } => EventType::RunError,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.event_type().is_terminal()
    }
}

/// Immutable envelope wrapped around every event the child emits (spec §3
/// "Event envelope"). Constructed once and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub contract_version: String,
    pub event_id: String,
    pub run_id: String,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub attempt: u32,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub parent_run_id: Option<String>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl EventEnvelope {
    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    pub fn is_terminal(&self) -> bool {
        self.payload.is_terminal()
    }
}
