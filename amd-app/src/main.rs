//! `amd`: run answering-machine detection over WAV recordings.
//!
//! Each file is treated as the far end of one outbound call. Calls run
//! concurrently on the engine's blocking pool; one JSON `CallReport` is
//! printed per file, in argument order.

mod channel;
mod executor;
mod settings;

use std::path::PathBuf;

use amd_core::{AmdEngine, AmdError, WavFrameSource};
use anyhow::{bail, Context};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use channel::CliChannel;
use executor::spawn_executor;
use settings::{default_settings_path, load_settings, save_settings};

const USAGE: &str = "Usage: amd [--settings <file.json>] [--args <overrides>] [--frame-ms <n>] \
[--write-settings] <file.wav>...";

#[derive(Debug, Default, PartialEq, Eq)]
struct CliArgs {
    settings: Option<PathBuf>,
    call_args: Option<String>,
    frame_ms: Option<u32>,
    write_settings: bool,
    help: bool,
    files: Vec<PathBuf>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<CliArgs> {
    let mut out = CliArgs::default();
    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--settings" => {
                let v = it.next().context("missing value for --settings")?;
                out.settings = Some(PathBuf::from(v));
            }
            "--args" => {
                out.call_args = Some(it.next().context("missing value for --args")?);
            }
            "--frame-ms" => {
                let v = it.next().context("missing value for --frame-ms")?;
                let ms = v
                    .parse::<u32>()
                    .ok()
                    .filter(|ms| *ms > 0)
                    .with_context(|| format!("invalid value for --frame-ms: {v}"))?;
                out.frame_ms = Some(ms);
            }
            "--write-settings" => out.write_settings = true,
            "--help" | "-h" => out.help = true,
            other if other.starts_with("--") => bail!("unknown argument: {other}"),
            _ => out.files.push(PathBuf::from(arg)),
        }
    }
    Ok(out)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("amd=info,amd_core=info")),
        )
        .init();

    let cli = parse_args(std::env::args().skip(1))?;
    if cli.help {
        println!("{USAGE}");
        return Ok(());
    }

    let settings_path = cli.settings.clone().unwrap_or_else(default_settings_path);
    let mut settings = load_settings(&settings_path);
    if let Some(call_args) = cli.call_args {
        settings.call_args = call_args;
    }
    if let Some(frame_ms) = cli.frame_ms {
        settings.frame_ms = frame_ms;
    }
    if cli.write_settings {
        save_settings(&settings_path, &settings)
            .with_context(|| format!("writing {}", settings_path.display()))?;
        info!("wrote settings to {}", settings_path.display());
    }
    if cli.files.is_empty() {
        if cli.write_settings {
            return Ok(());
        }
        bail!("no recordings given\n{USAGE}");
    }

    info!(
        settings = %settings_path.display(),
        frame_ms = settings.frame_ms,
        "AMD CLI starting"
    );

    let engine = AmdEngine::new(settings.amd);
    let mut events = engine.subscribe_events();
    let event_log = tokio::spawn(async move {
        let mut seen = 0usize;
        loop {
            match events.recv().await {
                Ok(event) => {
                    seen += 1;
                    info!(channel = %event.channel, "{}: {}", event.name, event.verdict());
                }
                Err(RecvError::Lagged(n)) => warn!("event log lagged, skipped {n} events"),
                Err(RecvError::Closed) => break,
            }
        }
        seen
    });

    let (executor, worker) = spawn_executor();
    let mut calls = Vec::with_capacity(cli.files.len());
    let mut failures = 0usize;
    for path in &cli.files {
        let source = match WavFrameSource::open(path, settings.frame_ms) {
            Ok(source) => source,
            Err(e) => {
                error!("skipping {}: {e}", path.display());
                failures += 1;
                continue;
            }
        };
        let channel = CliChannel::new(path, &settings, executor.clone());
        calls.push((
            path.clone(),
            engine.spawn_call(channel, source, settings.call_args.clone()),
        ));
    }
    drop(executor);

    for (path, call) in calls {
        let report = call
            .await
            .map_err(|e| AmdError::TaskFailed(e.to_string()))
            .and_then(|r| r);
        match report {
            Ok(report) => println!("{}", serde_json::to_string_pretty(&report)?),
            Err(e) => {
                error!("{}: {e}", path.display());
                failures += 1;
            }
        }
    }

    let diagnostics = engine.diagnostics_snapshot();
    drop(engine);
    let events_seen = event_log.await.unwrap_or_default();
    let hooks = tokio::task::spawn_blocking(move || worker.join())
        .await
        .map_err(|e| AmdError::TaskFailed(e.to_string()))?;

    info!(
        calls = diagnostics.calls_started,
        events = events_seen,
        hooks = hooks.len(),
        human = diagnostics.verdicts_human,
        machine = diagnostics.verdicts_machine,
        not_sure = diagnostics.verdicts_not_sure,
        "AMD CLI finished"
    );

    if failures > 0 {
        bail!("{failures} recording(s) failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn flags_and_files_are_separated() {
        let cli = parse_args(args(&[
            "--settings",
            "amd.json",
            "a.wav",
            "--args",
            "^^:greeting=2000",
            "--frame-ms",
            "30",
            "b.wav",
        ]))
        .expect("parse");
        assert_eq!(cli.settings, Some(PathBuf::from("amd.json")));
        assert_eq!(cli.call_args.as_deref(), Some("^^:greeting=2000"));
        assert_eq!(cli.frame_ms, Some(30));
        assert_eq!(cli.files, vec![PathBuf::from("a.wav"), PathBuf::from("b.wav")]);
    }

    #[test]
    fn bad_flags_are_rejected() {
        assert!(parse_args(args(&["--frame-ms", "0"])).is_err());
        assert!(parse_args(args(&["--frame-ms"])).is_err());
        assert!(parse_args(args(&["--verbose"])).is_err());
    }

    #[test]
    fn help_and_write_settings_need_no_files() {
        let cli = parse_args(args(&["-h", "--write-settings"])).expect("parse");
        assert!(cli.help);
        assert!(cli.write_settings);
        assert!(cli.files.is_empty());
    }
}
