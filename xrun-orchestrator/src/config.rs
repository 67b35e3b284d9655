// SPDX-License-Identifier: Apache-2.0

//! Ambient orchestrator settings, loaded from the environment the way the
//! teacher's `ddcommon::config` settings are (spec §5 "Cancellation and
//! timeouts", §4.1 "Maximum payload size").

use std::path::PathBuf;
use std::time::Duration;

mod parse_env {
    use std::{env, str::FromStr, time::Duration};

    pub fn duration_secs(name: &str) -> Option<Duration> {
        Some(Duration::from_secs_f32(env::var(name).ok()?.parse::<f32>().ok()?))
    }

    pub fn int<T: FromStr>(name: &str) -> Option<T> {
        env::var(name).ok()?.parse::<T>().ok()
    }

    pub fn path(name: &str) -> Option<PathBuf> {
        env::var(name).ok().filter(|s| !s.is_empty()).map(PathBuf::from)
    }
}

/// Settings that shape a run but are not part of any single invocation's
/// CLI arguments — defaults the spec leaves implementation-chosen.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Grace period between a termination signal and a forced kill (spec
    /// §5 "default on the order of seconds").
    pub termination_grace_period: Duration,
    /// Timeout bounding how long policy `close()` is allowed to run (spec
    /// §5 "Policy flush has its own timeout (default 30s)").
    pub policy_flush_timeout: Duration,
    /// Maximum accepted frame payload size (spec §4.1).
    pub max_payload_size: u32,
    /// Root directory for the content-addressed executor bundle cache
    /// (spec §4.2 step 2, §9 "global mutable state").
    pub bundle_cache_dir: PathBuf,
    /// Bound on retained `stderr_output` bytes surfaced in the outcome
    /// (spec §6 "Captured into the run result as stderr_output").
    pub stderr_capture_limit: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            termination_grace_period: Duration::from_secs(5),
            policy_flush_timeout: Duration::from_secs(30),
            max_payload_size: xrun_ipc::reader::DEFAULT_MAX_PAYLOAD_SIZE,
            bundle_cache_dir: std::env::temp_dir().join("xrun-bundle-cache"),
            stderr_capture_limit: 64 * 1024,
        }
    }
}

impl RunConfig {
    /// Overlays environment overrides onto the defaults. Unset or
    /// unparsable variables keep the default, matching the teacher's
    /// `parse_env` fallback behavior.
    pub fn from_env() -> Self {
        let mut config = RunConfig::default();
        if let Some(v) = parse_env::duration_secs("XRUN_TERMINATION_GRACE_SECS") {
            config.termination_grace_period = v;
        }
        if let Some(v) = parse_env::duration_secs("XRUN_POLICY_FLUSH_TIMEOUT_SECS") {
            config.policy_flush_timeout = v;
        }
        if let Some(v) = parse_env::int::<u32>("XRUN_MAX_PAYLOAD_SIZE") {
            config.max_payload_size = v;
        }
        if let Some(v) = parse_env::path("XRUN_BUNDLE_CACHE_DIR") {
            config.bundle_cache_dir = v;
        }
        if let Some(v) = parse_env::int::<usize>("XRUN_STDERR_CAPTURE_LIMIT") {
            config.stderr_capture_limit = v;
        }
        config
    }
}
