// SPDX-License-Identifier: Apache-2.0

//! A `tokio_util::codec::Decoder` over the same length-prefixed framing
//! `FrameReader` drives by hand (spec §4.1). Intended for programmatic
//! callers that want a `Stream<Item = Bytes>` via `FramedRead` — tests that
//! assemble a stream from an in-memory buffer, or a future transport that
//! isn't a child process's stdout — rather than the orchestrator's own
//! `read_raw` loop.

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::Decoder;
use xrun_core::DecodeError;

use crate::reader::DEFAULT_MAX_PAYLOAD_SIZE;

/// `Decoder::Error` must implement `From<std::io::Error>`; `DecodeError`
/// doesn't carry an I/O variant, so this wraps both.
#[derive(Debug, Error)]
pub enum FrameCodecError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Decodes one length-prefixed msgpack payload per call, same framing as
/// `FrameReader`. Yields the payload bytes only; dispatch still goes through
/// `decode_frame`.
pub struct FrameCodec {
    max_payload: u32,
}

impl FrameCodec {
    pub fn new() -> Self {
        FrameCodec {
            max_payload: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    pub fn with_max_payload(max_payload: u32) -> Self {
        FrameCodec { max_payload }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FrameCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes(src[..4].try_into().expect("checked above"));
        if len > self.max_payload {
            return Err(DecodeError::TooLarge {
                size: len,
                max: self.max_payload,
            }
            .into());
        }

        let frame_len = 4 + len as usize;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(frame_len);
        frame.advance(4);
        Ok(Some(frame.freeze()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(DecodeError::PartialFrame.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{decode_frame, WireFrame};
    use futures::StreamExt;
    use std::io::Cursor;
    use tokio_util::codec::FramedRead;
    use xrun_core::ArtifactChunkFrame;

    fn framed(payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + payload.len());
        buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    fn sample_stream(count: usize) -> Vec<u8> {
        let mut out = Vec::new();
        for i in 0..count {
            let chunk = ArtifactChunkFrame::new("art-1", i as u32, i + 1 == count, b"AAAA".to_vec());
            let bytes = rmp_serde::to_vec_named(&chunk).unwrap();
            out.extend_from_slice(&framed(&bytes));
        }
        out
    }

    #[tokio::test]
    async fn decodes_concatenated_frames_from_one_buffer() {
        let data = sample_stream(3);
        let mut reader = FramedRead::new(Cursor::new(data), FrameCodec::new());
        let mut frames = Vec::new();
        while let Some(item) = reader.next().await {
            frames.push(decode_frame(&item.unwrap()).unwrap());
        }
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| matches!(f, WireFrame::ArtifactChunk(_))));
    }

    #[tokio::test]
    async fn yields_none_on_clean_eof_at_frame_boundary() {
        let mut reader = FramedRead::new(Cursor::new(Vec::<u8>::new()), FrameCodec::new());
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn partial_frame_at_eof_is_an_error() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&10u32.to_be_bytes());
        buf.extend_from_slice(b"short");
        let mut reader = FramedRead::new(Cursor::new(buf), FrameCodec::new());
        let result = reader.next().await.expect("one item, an error");
        assert!(matches!(result, Err(FrameCodecError::Decode(DecodeError::PartialFrame))));
    }

    #[tokio::test]
    async fn oversized_payload_is_fatal_too_large() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&100u32.to_be_bytes());
        let mut reader = FramedRead::new(Cursor::new(buf), FrameCodec::with_max_payload(10));
        let result = reader.next().await.expect("one item, an error");
        assert!(matches!(
            result,
            Err(FrameCodecError::Decode(DecodeError::TooLarge { size: 100, max: 10 }))
        ));
    }
}
