// SPDX-License-Identifier: Apache-2.0

//! Typed error taxonomy for errors that cross an API boundary and must be
//! matched on. Internal plumbing (launch sequence, bundle extraction) uses
//! `anyhow::Error` instead, matching the teacher's split.

use thiserror::Error;

/// Frame decode failures (spec §4.1 "Failure modes").
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// EOF arrived mid-frame (after a length prefix but before the payload,
    /// or mid-length-prefix). Fatal.
    #[error("partial frame: stream ended before the declared payload was fully read")]
    PartialFrame,

    /// Declared payload length exceeded the configured cap. Fatal.
    #[error("frame of {size} bytes exceeds the maximum payload size of {max} bytes")]
    TooLarge { size: u32, max: u32 },

    /// Payload bytes did not parse as msgpack, or didn't decode into the
    /// expected structure. Recoverable: count and continue.
    #[error("malformed msgpack payload: {0}")]
    BadMsgpack(String),

    /// The `type` tag did not match a known frame kind. Recoverable.
    #[error("unknown frame type: {0}")]
    UnknownType(String),
}

impl DecodeError {
    /// Fatal errors abort the frame reader; recoverable ones are counted and
    /// the reader continues to the next frame.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DecodeError::PartialFrame | DecodeError::TooLarge { .. })
    }
}

/// Contract violations: logged and counted, never fatal on their own except
/// for a version mismatch, which classifies the whole run (spec §7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContractViolation {
    #[error("{0}")]
    VersionMismatch(String),

    #[error("non-monotonic sequence: expected {expected}, got {got}")]
    NonMonotonicSequence { expected: u64, got: u64 },

    #[error("frame arrived after the terminal event for this run")]
    FrameAfterTerminal,

    #[error("artifact {artifact_id} commit declared size_bytes={declared} but chunks summed to {actual}")]
    ChunkCommitSizeMismatch {
        artifact_id: String,
        declared: u64,
        actual: u64,
    },

    #[error("chunk for unknown or already-committed artifact {0} discarded")]
    StrayChunk(String),
}

/// Errors the ingestion policy can surface to the orchestrator.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("storage failure under strict policy: {0}")]
    StorageFailure(#[source] anyhow::Error),

    #[error("storage misconfigured: {0}")]
    Misconfigured(String),
}
