// SPDX-License-Identifier: Apache-2.0

//! Streaming length-prefixed frame reader (spec §4.1 "Streaming decode").
//!
//! Wraps the child's stdout in a `BufReader` to amortize syscalls against
//! pipes that may deliver one byte at a time, then loops: read a 4-byte
//! big-endian length prefix, read exactly that many payload bytes, hand the
//! bytes to the caller for dispatch. EOF before any length bytes is a clean
//! end of stream; EOF mid-frame is fatal.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use xrun_core::DecodeError;

/// Default cap on a single frame's payload size (spec §4.1, "implementation-
/// chosen, e.g. 16 MiB").
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

pub struct FrameReader<R> {
    inner: BufReader<R>,
    max_payload: u32,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        FrameReader {
            inner: BufReader::new(inner),
            max_payload: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    pub fn with_max_payload(inner: R, max_payload: u32) -> Self {
        FrameReader {
            inner: BufReader::new(inner),
            max_payload,
        }
    }

    /// Reads the next frame's raw payload bytes. `Ok(None)` signals a clean
    /// end of stream (EOF exactly at a frame boundary). Returned as `Bytes`
    /// so a caller that needs to hold onto the raw frame (e.g. to retry a
    /// dispatch, or hand it to more than one consumer) clones a refcount
    /// instead of the payload itself.
    pub async fn read_raw(&mut self) -> Result<Option<Bytes>, DecodeError> {
        let len = match self.read_length_prefix().await? {
            Some(len) => len,
            None => return Ok(None),
        };

        if len > self.max_payload {
            return Err(DecodeError::TooLarge {
                size: len,
                max: self.max_payload,
            });
        }

        self.read_payload(len).await.map(Some)
    }

    async fn read_length_prefix(&mut self) -> Result<Option<u32>, DecodeError> {
        let mut buf = [0u8; 4];
        let mut filled = 0usize;
        loop {
            let n = self
                .inner
                .read(&mut buf[filled..])
                .await
                .map_err(|_| DecodeError::PartialFrame)?;
            if n == 0 {
                return if filled == 0 {
                    Ok(None)
                } else {
                    Err(DecodeError::PartialFrame)
                };
            }
            filled += n;
            if filled == buf.len() {
                return Ok(Some(u32::from_be_bytes(buf)));
            }
        }
    }

    async fn read_payload(&mut self, len: u32) -> Result<Bytes, DecodeError> {
        let mut buf = BytesMut::zeroed(len as usize);
        let mut filled = 0usize;
        while filled < buf.len() {
            let n = self
                .inner
                .read(&mut buf[filled..])
                .await
                .map_err(|_| DecodeError::PartialFrame)?;
            if n == 0 {
                return Err(DecodeError::PartialFrame);
            }
            filled += n;
        }
        Ok(buf.freeze())
    }
}
