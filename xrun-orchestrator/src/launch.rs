// SPDX-License-Identifier: Apache-2.0

//! The launch sequence (spec §4.2 steps 1-7): validate the script path,
//! extract the executor bundle, build and spawn the child command, and
//! write the initial metadata line.

use crate::bundle::BundleCache;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};
use xrun_core::RunIdentity;

/// Everything the caller must supply to launch a run (spec §6 "CLI surface").
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub identity: RunIdentity,
    pub script_path: PathBuf,
    /// Executor bundle bytes to extract via the content-addressed cache.
    /// Ignored when `executor_override` is set.
    pub executor_bundle: Vec<u8>,
    /// Explicit executor path, bypassing bundle extraction (spec §6
    /// "executor path override").
    pub executor_override: Option<PathBuf>,
    pub job: serde_json::Value,
    pub proxy: Option<serde_json::Value>,
    pub storage: Option<serde_json::Value>,
    pub browser_ws_endpoint: Option<String>,
}

impl LaunchSpec {
    /// The job payload must be a JSON object (spec §6 "arrays/primitives/
    /// null are rejected").
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.job.is_object() {
            anyhow::bail!("job payload must be a JSON object, got {:?}", self.job);
        }
        if !self.script_path.exists() {
            anyhow::bail!("script path does not exist: {}", self.script_path.display());
        }
        Ok(())
    }
}

/// The first line written to the child's stdin (spec §4.2 step 6).
#[derive(Debug, Serialize)]
struct RunMetadata<'a> {
    run_id: &'a str,
    attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_run_id: Option<&'a str>,
    job: &'a serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxy: Option<&'a serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    storage: Option<&'a serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    browser_ws_endpoint: Option<&'a str>,
}

/// Resolves the executor binary path: either the override, or the bundle
/// extracted into `cache`.
pub fn resolve_executor_path(spec: &LaunchSpec, cache: &BundleCache) -> anyhow::Result<PathBuf> {
    if let Some(path) = &spec.executor_override {
        return Ok(path.clone());
    }
    cache.ensure_extracted(&spec.executor_bundle)
}

/// Spawns the child with piped stdin/stdout/stderr (spec §4.2 steps 3-5).
pub fn spawn_child(executor_path: &PathBuf, spec: &LaunchSpec) -> anyhow::Result<Child> {
    let child = Command::new(executor_path)
        .arg(&spec.script_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;
    Ok(child)
}

/// Renders the metadata line (without the trailing write) for step 6.
pub fn metadata_line(spec: &LaunchSpec) -> anyhow::Result<RunMetadataOwned> {
    let metadata = RunMetadata {
        run_id: &spec.identity.run_id,
        attempt: spec.identity.attempt,
        job_id: spec.identity.job_id.as_deref(),
        parent_run_id: spec.identity.parent_run_id.as_deref(),
        job: &spec.job,
        proxy: spec.proxy.as_ref(),
        storage: spec.storage.as_ref(),
        browser_ws_endpoint: spec.browser_ws_endpoint.as_deref(),
    };
    Ok(RunMetadataOwned(serde_json::to_value(metadata)?))
}

/// Owned wrapper so callers don't need the borrowed `RunMetadata` alive
/// past this function.
pub struct RunMetadataOwned(pub serde_json::Value);
