// SPDX-License-Identifier: Apache-2.0

//! Non-event frame kinds carried on the wire: artifact binary chunks,
//! parent-handled sidecar file writes, and the advisory run-result frame
//! (spec §3). Each carries its own `type` marker field so the wire
//! representation matches spec §4.1 ("payload is a msgpack map containing
//! at least a `type` field").

use serde::{Deserialize, Serialize};

macro_rules! frame_tag {
    ($name:ident, $wire:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
        pub enum $name {
            #[default]
            #[serde(rename = $wire)]
            Tag,
        }
    };
}

frame_tag!(ArtifactChunkTag, "artifact_chunk");
frame_tag!(FileWriteTag, "file_write");
frame_tag!(FileWriteAckTag, "file_write_ack");
frame_tag!(RunResultTag, "run_result");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactChunkFrame {
    #[serde(rename = "type")]
    pub tag: ArtifactChunkTag,
    pub artifact_id: String,
    pub seq: u32,
    pub is_last: bool,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

impl ArtifactChunkFrame {
    pub fn new(artifact_id: impl Into<String>, seq: u32, is_last: bool, data: Vec<u8>) -> Self {
        ArtifactChunkFrame {
            tag: ArtifactChunkTag::Tag,
            artifact_id: artifact_id.into(),
            seq,
            is_last,
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileWriteFrame {
    #[serde(rename = "type")]
    pub tag: FileWriteTag,
    pub write_id: u64,
    pub filename: String,
    pub mime_type: String,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileWriteAckFrame {
    #[serde(rename = "type")]
    pub tag: FileWriteAckTag,
    pub write_id: u64,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl FileWriteAckFrame {
    pub fn ok(write_id: u64) -> Self {
        FileWriteAckFrame {
            tag: FileWriteAckTag::Tag,
            write_id,
            ok: true,
            error: None,
        }
    }

    pub fn err(write_id: u64, error: impl Into<String>) -> Self {
        FileWriteAckFrame {
            tag: FileWriteAckTag::Tag,
            write_id,
            ok: false,
            error: Some(error.into()),
        }
    }
}

/// Post-terminal summary the child may write before closing stdout. Treated
/// as advisory — the first terminal event wins (spec §9 open question).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResultFrame {
    #[serde(rename = "type")]
    pub tag: RunResultTag,
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}
