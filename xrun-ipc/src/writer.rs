// SPDX-License-Identifier: Apache-2.0

//! Stdin-side framing: the one-line JSON metadata write at launch, and
//! length-prefixed msgpack frames thereafter (spec §4.1, §4.2, §6).

use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Encodes `body` as a length-prefixed msgpack frame, ready to write to
/// stdin. Errors here are a local bug (the value didn't serialize), never a
/// wire/decode condition, hence `anyhow`.
pub fn encode_frame<T: Serialize>(body: &T) -> anyhow::Result<Vec<u8>> {
    let payload = rmp_serde::to_vec_named(body)?;
    if payload.len() > u32::MAX as usize {
        anyhow::bail!("frame payload of {} bytes exceeds u32::MAX", payload.len());
    }
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Writes the one-line JSON metadata object that must precede any framed
/// control messages on stdin (spec §4.2 step 6).
pub async fn write_metadata_line<W, T>(writer: &mut W, metadata: &T) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(metadata)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Writes a single pre-encoded frame, honoring the pipe's backpressure by
/// awaiting the write future to completion rather than attempting a
/// fire-and-forget send (spec §4.1 "Backpressure").
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &[u8]) -> anyhow::Result<()> {
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}
