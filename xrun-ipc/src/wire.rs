// SPDX-License-Identifier: Apache-2.0

//! Dispatch from a probed `type` tag to a fully-decoded frame (spec §4.1
//! "Dispatch must not fully deserialize the payload just to discover the
//! frame type").

use crate::probe::probe_type;
use xrun_core::{ArtifactChunkFrame, DecodeError, EventEnvelope, FileWriteFrame, RunResultFrame};

const EVENT_TYPE_TAGS: [&str; 8] = [
    "item",
    "artifact",
    "checkpoint",
    "enqueue",
    "rotate_proxy",
    "log",
    "run_complete",
    "run_error",
];

#[derive(Debug, Clone, PartialEq)]
pub enum WireFrame {
    Event(EventEnvelope),
    ArtifactChunk(ArtifactChunkFrame),
    FileWrite(FileWriteFrame),
    RunResult(RunResultFrame),
}

/// Probes `payload` for its `type` tag, then decodes the whole payload into
/// the matching concrete frame. Unknown types and malformed payloads are
/// recoverable errors (spec §4.1 "Failure modes"); the caller decides
/// whether to count-and-continue or abort.
pub fn decode_frame(payload: &[u8]) -> Result<WireFrame, DecodeError> {
    let type_tag = probe_type(payload)?;

    if EVENT_TYPE_TAGS.contains(&type_tag.as_str()) {
        return rmp_serde::from_slice(payload)
            .map(WireFrame::Event)
            .map_err(|e| DecodeError::BadMsgpack(e.to_string()));
    }

    match type_tag.as_str() {
        "artifact_chunk" => rmp_serde::from_slice(payload)
            .map(WireFrame::ArtifactChunk)
            .map_err(|e| DecodeError::BadMsgpack(e.to_string())),
        "file_write" => rmp_serde::from_slice(payload)
            .map(WireFrame::FileWrite)
            .map_err(|e| DecodeError::BadMsgpack(e.to_string())),
        "run_result" => rmp_serde::from_slice(payload)
            .map(WireFrame::RunResult)
            .map_err(|e| DecodeError::BadMsgpack(e.to_string())),
        other => Err(DecodeError::UnknownType(other.to_string())),
    }
}
