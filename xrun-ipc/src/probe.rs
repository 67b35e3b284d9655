// SPDX-License-Identifier: Apache-2.0

//! Zero-copy scan of a msgpack-encoded top-level map for its `type` key.
//!
//! Dispatch must not pay for a full decode just to learn which decoder path
//! a frame takes (spec §4.1 "Type probing"). This walks the map's keys in
//! order, reading each key as a string, and either returns the `type`
//! value or skips the value's bytes via `Seek` without allocating.

use rmp::decode::{read_marker, ValueReadError};
use rmp::Marker;
use std::io::{Cursor, Read, Seek, SeekFrom};
use xrun_core::DecodeError;

/// Scans `payload` for a top-level `"type": "<value>"` entry and returns the
/// value, without decoding any other key.
pub fn probe_type(payload: &[u8]) -> Result<String, DecodeError> {
    let mut cur = Cursor::new(payload);
    let map_len = read_map_len_compat(&mut cur)?;

    for _ in 0..map_len {
        let key = read_str_owned(&mut cur)?;
        if key == "type" {
            return read_str_owned(&mut cur);
        }
        skip_value(&mut cur)?;
    }

    Err(DecodeError::BadMsgpack(
        "payload map has no `type` key".to_string(),
    ))
}

fn read_map_len_compat(cur: &mut Cursor<&[u8]>) -> Result<u32, DecodeError> {
    rmp::decode::read_map_len(cur).map_err(|e| DecodeError::BadMsgpack(e.to_string()))
}

fn read_str_owned(cur: &mut Cursor<&[u8]>) -> Result<String, DecodeError> {
    let marker = read_marker(cur).map_err(marker_err)?;
    let len = match marker {
        Marker::FixStr(n) => n as u32,
        Marker::Str8 => read_u8(cur)? as u32,
        Marker::Str16 => read_u16(cur)? as u32,
        Marker::Str32 => read_u32(cur)?,
        other => {
            return Err(DecodeError::BadMsgpack(format!(
                "expected a string key/value, found marker {other:?}"
            )))
        }
    };
    let mut buf = vec![0u8; len as usize];
    cur.read_exact(&mut buf)
        .map_err(|e| DecodeError::BadMsgpack(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| DecodeError::BadMsgpack(e.to_string()))
}

/// Skips the next msgpack value's bytes entirely, recursing into
/// arrays/maps, without allocating their contents.
fn skip_value(cur: &mut Cursor<&[u8]>) -> Result<(), DecodeError> {
    let marker = read_marker(cur).map_err(marker_err)?;
    match marker {
        Marker::FixPos(_)
        | Marker::FixNeg(_)
        | Marker::Null
        | Marker::True
        | Marker::False => Ok(()),
        Marker::U8 | Marker::I8 => skip_bytes(cur, 1),
        Marker::U16 | Marker::I16 => skip_bytes(cur, 2),
        Marker::U32 | Marker::I32 | Marker::F32 => skip_bytes(cur, 4),
        Marker::U64 | Marker::I64 | Marker::F64 => skip_bytes(cur, 8),
        Marker::FixStr(n) => skip_bytes(cur, n as i64),
        Marker::Str8 | Marker::Bin8 => {
            let n = read_u8(cur)?;
            skip_bytes(cur, n as i64)
        }
        Marker::Str16 | Marker::Bin16 => {
            let n = read_u16(cur)?;
            skip_bytes(cur, n as i64)
        }
        Marker::Str32 | Marker::Bin32 => {
            let n = read_u32(cur)?;
            skip_bytes(cur, n as i64)
        }
        Marker::FixArray(n) => skip_n_values(cur, n as u32),
        Marker::Array16 => {
            let n = read_u16(cur)?;
            skip_n_values(cur, n as u32)
        }
        Marker::Array32 => {
            let n = read_u32(cur)?;
            skip_n_values(cur, n)
        }
        Marker::FixMap(n) => skip_n_values(cur, n as u32 * 2),
        Marker::Map16 => {
            let n = read_u16(cur)?;
            skip_n_values(cur, n as u32 * 2)
        }
        Marker::Map32 => {
            let n = read_u32(cur)?;
            skip_n_values(cur, n * 2)
        }
        Marker::FixExt1 => skip_bytes(cur, 1 + 1),
        Marker::FixExt2 => skip_bytes(cur, 1 + 2),
        Marker::FixExt4 => skip_bytes(cur, 1 + 4),
        Marker::FixExt8 => skip_bytes(cur, 1 + 8),
        Marker::FixExt16 => skip_bytes(cur, 1 + 16),
        Marker::Ext8 => {
            let n = read_u8(cur)?;
            skip_bytes(cur, 1 + n as i64)
        }
        Marker::Ext16 => {
            let n = read_u16(cur)?;
            skip_bytes(cur, 1 + n as i64)
        }
        Marker::Ext32 => {
            let n = read_u32(cur)?;
            skip_bytes(cur, 1 + n as i64)
        }
        Marker::Reserved => Err(DecodeError::BadMsgpack("reserved marker byte".to_string())),
    }
}

fn skip_n_values(cur: &mut Cursor<&[u8]>, n: u32) -> Result<(), DecodeError> {
    for _ in 0..n {
        skip_value(cur)?;
    }
    Ok(())
}

fn skip_bytes(cur: &mut Cursor<&[u8]>, n: i64) -> Result<(), DecodeError> {
    let new_pos = cur
        .seek(SeekFrom::Current(n))
        .map_err(|e| DecodeError::BadMsgpack(e.to_string()))?;
    if new_pos > cur.get_ref().len() as u64 {
        return Err(DecodeError::BadMsgpack(
            "value length runs past end of payload".to_string(),
        ));
    }
    Ok(())
}

fn read_u8(cur: &mut Cursor<&[u8]>) -> Result<u8, DecodeError> {
    let mut buf = [0u8; 1];
    cur.read_exact(&mut buf)
        .map_err(|e| DecodeError::BadMsgpack(e.to_string()))?;
    Ok(buf[0])
}

fn read_u16(cur: &mut Cursor<&[u8]>) -> Result<u16, DecodeError> {
    let mut buf = [0u8; 2];
    cur.read_exact(&mut buf)
        .map_err(|e| DecodeError::BadMsgpack(e.to_string()))?;
    Ok(u16::from_be_bytes(buf))
}

fn read_u32(cur: &mut Cursor<&[u8]>) -> Result<u32, DecodeError> {
    let mut buf = [0u8; 4];
    cur.read_exact(&mut buf)
        .map_err(|e| DecodeError::BadMsgpack(e.to_string()))?;
    Ok(u32::from_be_bytes(buf))
}

fn marker_err(e: ValueReadError) -> DecodeError {
    DecodeError::BadMsgpack(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use xrun_core::{EventEnvelope, EventPayload};

    fn envelope(payload: EventPayload) -> EventEnvelope {
        EventEnvelope {
            contract_version: xrun_core::CONTRACT_VERSION.to_string(),
            event_id: "evt-1".into(),
            run_id: "run-1".into(),
            sequence: 1,
            timestamp: chrono::Utc::now(),
            attempt: 1,
            job_id: None,
            parent_run_id: None,
            payload,
        }
    }

    #[test]
    fn finds_type_among_other_keys() {
        let env = envelope(EventPayload::Item {
            item_type: "product".into(),
            data: serde_json::json!({"nested": {"a": [1,2,3]}, "s": "hi"}),
        });
        let bytes = rmp_serde::to_vec_named(&env).unwrap();
        assert_eq!(probe_type(&bytes).unwrap(), "item");
    }

    #[test]
    fn finds_type_for_each_event_variant() {
        let cases = vec![
            (EventPayload::Checkpoint { label: None, progress: None }, "checkpoint"),
            (EventPayload::RotateProxy { reason: None }, "rotate_proxy"),
            (
                EventPayload::RunComplete { summary: None },
                "run_complete",
            ),
            (
                EventPayload::RunError {
                    error_type: "x".into(),
                    message: "y".into(),
                    stack: None,
                },
                "run_error",
            ),
        ];
        for (payload, expected) in cases {
            let bytes = rmp_serde::to_vec_named(&envelope(payload)).unwrap();
            assert_eq!(probe_type(&bytes).unwrap(), expected);
        }
    }

    #[test]
    fn missing_type_key_is_bad_msgpack() {
        let mut buf = Vec::new();
        rmp::encode::write_map_len(&mut buf, 1).unwrap();
        rmp::encode::write_str(&mut buf, "other").unwrap();
        rmp::encode::write_uint(&mut buf, 1).unwrap();
        assert!(matches!(
            probe_type(&buf),
            Err(DecodeError::BadMsgpack(_))
        ));
    }
}
