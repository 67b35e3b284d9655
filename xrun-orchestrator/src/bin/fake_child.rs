// SPDX-License-Identifier: Apache-2.0

//! Test-fixture child process used by `tests/end_to_end.rs` to drive
//! `RunOrchestrator::execute` through the spec's end-to-end scenarios
//! without depending on a real browser-automation executor. Never shipped
//! as part of the `xrun` CLI surface.
//!
//! The script path argument the orchestrator passes (spec §4.2 step 3) is
//! repurposed here: its contents name the scenario to play back.

use std::io::Write;
use xrun_core::{ArtifactChunkFrame, EventEnvelope, EventPayload, LogLevel};
use xrun_ipc::encode_frame;

fn envelope(seq: u64, contract_version: &str, payload: EventPayload) -> EventEnvelope {
    EventEnvelope {
        contract_version: contract_version.to_string(),
        event_id: format!("evt-{seq}"),
        run_id: "fake-run".to_string(),
        sequence: seq,
        timestamp: chrono::Utc::now(),
        attempt: 1,
        job_id: None,
        parent_run_id: None,
        payload,
    }
}

fn write_event_with_version(seq: u64, version: &str, payload: EventPayload) {
    let env = envelope(seq, version, payload);
    let frame = encode_frame(&env).expect("encode event envelope");
    let mut out = std::io::stdout();
    out.write_all(&frame).expect("write event frame");
    out.flush().expect("flush stdout");
}

fn write_event(seq: u64, payload: EventPayload) {
    write_event_with_version(seq, xrun_core::CONTRACT_VERSION, payload);
}

fn write_chunk(chunk: ArtifactChunkFrame) {
    let frame = encode_frame(&chunk).expect("encode chunk frame");
    let mut out = std::io::stdout();
    out.write_all(&frame).expect("write chunk frame");
    out.flush().expect("flush stdout");
}

fn happy_path() -> ! {
    write_event(
        1,
        EventPayload::Item {
            item_type: "row".into(),
            data: serde_json::json!({"n": 1}),
        },
    );
    write_event(
        2,
        EventPayload::Log {
            level: LogLevel::Info,
            message: "hello".into(),
            fields: None,
        },
    );
    write_event(3, EventPayload::RunComplete { summary: None });
    std::process::exit(0);
}

fn artifact_commit() -> ! {
    write_chunk(ArtifactChunkFrame::new("art-a", 1, false, b"AAAA".to_vec()));
    write_chunk(ArtifactChunkFrame::new("art-a", 2, true, b"BBBB".to_vec()));
    write_event(
        1,
        EventPayload::Artifact {
            artifact_id: "art-a".into(),
            name: "out.bin".into(),
            mime_type: "application/octet-stream".into(),
            size_bytes: 8,
        },
    );
    write_event(2, EventPayload::RunComplete { summary: None });
    std::process::exit(0);
}

fn script_error() -> ! {
    write_event(
        1,
        EventPayload::Item {
            item_type: "row".into(),
            data: serde_json::json!({}),
        },
    );
    write_event(
        2,
        EventPayload::RunError {
            error_type: "script_error".into(),
            message: "x".into(),
            stack: None,
        },
    );
    std::process::exit(1);
}

fn crash_no_terminal() -> ! {
    write_event(
        1,
        EventPayload::Item {
            item_type: "row".into(),
            data: serde_json::json!({}),
        },
    );
    std::process::exit(2);
}

fn buffered_overflow() -> ! {
    for seq in 1..=10 {
        write_event(
            seq,
            EventPayload::Item {
                item_type: "row".into(),
                data: serde_json::json!({"seq": seq}),
            },
        );
    }
    write_event(11, EventPayload::RunComplete { summary: None });
    std::process::exit(0);
}

fn version_mismatch() -> ! {
    write_event_with_version(
        1,
        "0.9.9",
        EventPayload::Checkpoint {
            label: None,
            progress: None,
        },
    );
    std::process::exit(0);
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let script_path = args.get(1).expect("fake_child requires a script path arg");
    let scenario = std::fs::read_to_string(script_path).unwrap_or_default();
    match scenario.trim() {
        "happy_path" => happy_path(),
        "artifact_commit" => artifact_commit(),
        "script_error" => script_error(),
        "crash_no_terminal" => crash_no_terminal(),
        "buffered_overflow" => buffered_overflow(),
        "version_mismatch" => version_mismatch(),
        other => {
            eprintln!("fake_child: unknown scenario `{other}`");
            std::process::exit(99);
        }
    }
}
