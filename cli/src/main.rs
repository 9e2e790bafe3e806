//! Toolgate CLI - headless replay of a scripted tool turn.
//!
//! # Architecture
//!
//! The CLI wires [`toolgate_engine`] to a terminal: a scenario file stands in
//! for the model and the tool transport, stdin stands in for the operator.
//!
//! ```text
//! main() -> Scenario::load -> TurnDriver::drive -> ToolOrchestrator
//!                                  |        ^
//!                   ScriptedExecutor        StdinOperator / Ctrl-C
//!                                  |
//!                                  v
//!                         StdoutSink (transcript lines)
//! ```

mod operator;
mod render;

use anyhow::{Context, Result, bail};
use std::{
    env,
    fs::{self, OpenOptions},
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use toolgate_engine::{
    OrchestratorSettings, Scenario, ToolOrchestrator, ToolgateConfig, TurnDriver, TurnOutcome,
};

use crate::operator::StdinOperator;
use crate::render::StdoutSink;

const USAGE: &str = "usage: toolgate <scenario.json> [--config <config.toml>] [--save <record.json>]";

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (log_file, init_warnings) = open_toolgate_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // Stdout carries the transcript and the prompts; no log file means no logs.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_toolgate_log_file() -> (Option<(PathBuf, std::fs::File)>, Vec<String>) {
    let candidates = toolgate_log_file_candidates();
    let mut warnings = Vec::new();

    for candidate in candidates {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn toolgate_log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.toolgate/logs/toolgate.log
    if let Some(config_path) = ToolgateConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("toolgate.log"));
    }

    // Fallback: ./.toolgate/logs/toolgate.log
    candidates.push(PathBuf::from(".toolgate").join("logs").join("toolgate.log"));

    candidates
}

#[derive(Debug, Default, PartialEq, Eq)]
struct CliArgs {
    scenario: PathBuf,
    config: Option<PathBuf>,
    save: Option<PathBuf>,
}

impl CliArgs {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut scenario = None;
        let mut parsed = Self::default();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let path = args.next().context("--config needs a path")?;
                    parsed.config = Some(PathBuf::from(path));
                }
                "--save" => {
                    let path = args.next().context("--save needs a path")?;
                    parsed.save = Some(PathBuf::from(path));
                }
                "-h" | "--help" => bail!(USAGE),
                flag if flag.starts_with("--") => bail!("unknown flag {flag}\n{USAGE}"),
                _ if scenario.is_none() => scenario = Some(PathBuf::from(arg)),
                _ => bail!("unexpected argument {arg}\n{USAGE}"),
            }
        }

        parsed.scenario = scenario.context(USAGE)?;
        Ok(parsed)
    }
}

fn load_config(explicit: Option<&PathBuf>) -> Result<Option<ToolgateConfig>> {
    if let Some(path) = explicit {
        return ToolgateConfig::load_from(path).map(Some).map_err(Into::into);
    }
    // A broken default config degrades to defaults; the loader already logged it.
    Ok(ToolgateConfig::load().ok().flatten())
}

fn main() -> Result<()> {
    init_tracing();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    let result = runtime.block_on(run());
    // A cancelled prompt can leave a stdin read parked on a blocking thread;
    // waiting for it would hold the process until the next line of input.
    runtime.shutdown_background();
    result
}

async fn run() -> Result<()> {
    let args = CliArgs::parse(env::args().skip(1))?;
    let config = load_config(args.config.as_ref())?;
    let settings = OrchestratorSettings::from_config(config.as_ref());

    let scenario = Scenario::load(&args.scenario)?;
    let mut orchestrator = ToolOrchestrator::new(scenario.conversation.clone(), settings);
    let driver = TurnDriver::new(Arc::new(scenario.executor()), Arc::new(StdinOperator));

    let (cancel_tx, mut cancel_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if cancel_tx.try_send(()).is_err() && cancel_tx.is_closed() {
                break;
            }
        }
    });

    let mut sink = StdoutSink;
    let outcome = driver
        .drive(
            &mut orchestrator,
            scenario.turn_input(),
            &mut cancel_rx,
            &mut sink,
        )
        .await?;
    tracing::info!(conversation = %orchestrator.conversation_id(), ?outcome, "Turn finished");

    if let Some(update) = orchestrator.take_persistence_update() {
        let record = orchestrator.record();
        let json = serde_json::to_string_pretty(&record)?;
        match &args.save {
            Some(path) => {
                fs::write(path, json)
                    .with_context(|| format!("failed to save record to {}", path.display()))?;
                println!(
                    "Saved {} always-allowed tool(s) to {}",
                    update.allowed_tools.len(),
                    path.display()
                );
            }
            None => println!("{json}"),
        }
    }

    if let TurnOutcome::Errored { message } = outcome {
        bail!("turn ended with an error: {message}");
    }
    Ok(())
}
