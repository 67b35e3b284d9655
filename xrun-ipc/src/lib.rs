// SPDX-License-Identifier: Apache-2.0

//! The framed IPC layer: a length-prefixed, tagged binary protocol carrying
//! typed events, artifact chunks, and file-write control frames between the
//! orchestrator and the child executor process (spec §4.1).

pub mod codec;
pub mod probe;
pub mod reader;
pub mod writer;
pub mod wire;

pub use codec::{FrameCodec, FrameCodecError};
pub use reader::{FrameReader, DEFAULT_MAX_PAYLOAD_SIZE};
pub use wire::{decode_frame, WireFrame};
pub use writer::{encode_frame, write_frame, write_metadata_line};
