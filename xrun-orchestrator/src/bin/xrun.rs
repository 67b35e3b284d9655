// SPDX-License-Identifier: Apache-2.0

//! CLI entry point for a single extraction run (spec §6 "CLI surface").

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use xrun_core::RunIdentity;
use xrun_metrics::MetricsCollector;
use xrun_orchestrator::{FsStorageSink, LaunchSpec, RunConfig, RunOrchestrator};
use xrun_policy::{BufferedPolicy, FlushMode, IngestionPolicy, StrictPolicy};
use xrun_proxy::{ProxyEndpoint, ProxyPoolConfig, SelectionContext};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FlushModeArg {
    AtLeastOnce,
    ChunksFirst,
    TwoPhase,
}

impl From<FlushModeArg> for FlushMode {
    fn from(value: FlushModeArg) -> Self {
        match value {
            FlushModeArg::AtLeastOnce => FlushMode::AtLeastOnce,
            FlushModeArg::ChunksFirst => FlushMode::ChunksFirst,
            FlushModeArg::TwoPhase => FlushMode::TwoPhase,
        }
    }
}

/// Supervises a single extraction script run.
#[derive(Debug, Parser)]
#[command(name = "xrun", version)]
struct Cli {
    /// Path to the user-authored extraction script.
    #[arg(long)]
    script: PathBuf,

    /// Opaque run identifier, propagated on every event. Defaults to a
    /// freshly generated UUID when omitted.
    #[arg(long)]
    run_id: Option<String>,

    /// Storage backend selector. Only `fs` ships in this crate; other
    /// backends are external collaborators (spec §1 "Out of scope").
    #[arg(long, default_value = "fs")]
    storage_backend: String,

    /// Root path for the storage backend.
    #[arg(long)]
    storage_path: PathBuf,

    #[arg(long, default_value_t = 1)]
    attempt: u32,

    #[arg(long)]
    job_id: Option<String>,

    #[arg(long)]
    parent_run_id: Option<String>,

    /// Inline JSON object for the job payload.
    #[arg(long, conflicts_with = "job_file")]
    job_json: Option<String>,

    /// Path to a file containing the job JSON object.
    #[arg(long, conflicts_with = "job_json")]
    job_file: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = PolicyChoiceArg::Strict)]
    policy: PolicyChoiceArg,

    #[arg(long)]
    buffer_events: Option<u64>,

    #[arg(long)]
    buffer_bytes: Option<u64>,

    #[arg(long, value_enum, default_value_t = FlushModeArg::AtLeastOnce)]
    flush_mode: FlushModeArg,

    /// Bypasses the embedded executor bundle cache and runs this binary
    /// directly as the child.
    #[arg(long)]
    executor_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    quiet: bool,

    #[arg(long)]
    browser_ws_endpoint: Option<String>,

    /// YAML file describing one proxy pool (spec §4.4, §6 "proxy
    /// configuration via YAML").
    #[arg(long)]
    proxy_config: Option<PathBuf>,

    #[arg(long)]
    proxy_domain: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum PolicyChoiceArg {
    Strict,
    Buffered,
}

fn init_logging(quiet: bool) {
    let filter = if quiet { "warn" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .try_init();
}

fn load_job(cli: &Cli) -> anyhow::Result<serde_json::Value> {
    if let Some(inline) = &cli.job_json {
        return Ok(serde_json::from_str(inline)?);
    }
    if let Some(path) = &cli.job_file {
        let text = std::fs::read_to_string(path)?;
        return Ok(serde_json::from_str(&text)?);
    }
    Ok(serde_json::json!({}))
}

/// Loads one proxy pool from YAML and selects (committing) one endpoint to
/// embed in the launch metadata's `proxy` field.
fn select_proxy(cli: &Cli) -> anyhow::Result<Option<ProxyEndpoint>> {
    let Some(path) = &cli.proxy_config else {
        return Ok(None);
    };
    let text = std::fs::read_to_string(path)?;
    let config: ProxyPoolConfig = serde_yaml::from_str(&text)?;
    let warnings = config.validate()?;
    for warning in warnings {
        tracing::warn!(?warning, "proxy pool validation warning");
    }
    let pool = xrun_proxy::ProxyPool::new(config);
    let ctx = SelectionContext {
        explicit_key: None,
        job_id: cli.job_id.as_deref(),
        domain: cli.proxy_domain.as_deref(),
        origin: None,
    };
    Ok(Some(pool.commit(&ctx)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet);

    let job = load_job(&cli)?;
    if !job.is_object() {
        anyhow::bail!("job payload must be a JSON object");
    }

    let proxy_endpoint = select_proxy(&cli)?;
    let proxy = proxy_endpoint
        .map(|endpoint| serde_json::to_value(endpoint))
        .transpose()?;

    let run_id = cli.run_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let mut identity = RunIdentity::new(run_id).with_attempt(cli.attempt);
    if let Some(job_id) = &cli.job_id {
        identity = identity.with_job_id(job_id.clone());
    }
    if let Some(parent) = &cli.parent_run_id {
        identity = identity.with_parent_run_id(parent.clone());
    }

    let spec = LaunchSpec {
        identity,
        script_path: cli.script.clone(),
        executor_bundle: Vec::new(),
        executor_override: cli.executor_path.clone(),
        job,
        proxy,
        storage: Some(serde_json::json!({
            "backend": cli.storage_backend,
            "path": cli.storage_path,
        })),
        browser_ws_endpoint: cli.browser_ws_endpoint.clone(),
    };

    if cli.storage_backend != "fs" {
        anyhow::bail!("unsupported storage backend `{}` (only `fs` ships in this crate)", cli.storage_backend);
    }
    let storage = Arc::new(FsStorageSink::new(cli.storage_path.clone()).await?);

    let policy: Arc<dyn IngestionPolicy> = match cli.policy {
        PolicyChoiceArg::Strict => Arc::new(StrictPolicy::new(storage.clone())),
        PolicyChoiceArg::Buffered => {
            let max_events = cli.buffer_events.unwrap_or(0);
            let max_bytes = cli.buffer_bytes.unwrap_or(0);
            Arc::new(BufferedPolicy::new(storage.clone(), max_events, max_bytes, cli.flush_mode.into())?)
        }
    };

    let config = RunConfig::from_env();
    let orchestrator = RunOrchestrator::new(config);
    let metrics = MetricsCollector::new();
    let cancel = CancellationToken::new();

    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown_cancel.cancel();
        }
    });

    let outcome = orchestrator
        .execute(spec, policy, storage, None, &metrics, cancel)
        .await?;

    print_summary(&outcome);
    std::process::exit(outcome.exit_code());
}

fn print_summary(outcome: &xrun_core::Outcome) {
    println!("run_id:        {}", outcome.run_id);
    println!("attempt:       {}", outcome.attempt);
    println!("status:        {:?}", outcome.status);
    println!("duration_ms:   {}", outcome.duration_ms);
    println!("policy:        {}", outcome.policy_name);
    println!("events:        persisted={} dropped={}", outcome.events_persisted, outcome.events_dropped);
    if !outcome.dropped_by_type.is_empty() {
        println!("dropped_by_type: {:?}", outcome.dropped_by_type);
    }
    if outcome.buffered_bytes > 0 {
        println!("buffered_bytes: {}", outcome.buffered_bytes);
    }
    if !outcome.orphan_artifact_ids.is_empty() {
        println!("orphan_artifacts: {:?}", outcome.orphan_artifact_ids);
    }
    if let Some(message) = &outcome.message {
        println!("message:       {message}");
    }
    if !outcome.is_success() && !outcome.stderr_output.is_empty() {
        println!("--- child stderr ---");
        println!("{}", outcome.stderr_output);
    }
}
