fn main() {
    if let Err(e) = run() {
        eprintln!("benchmark failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    use amd_core::{AmdCause, AmdEngine, AmdParams, AmdResult, MemoryChannel, WavFrameSource};
    use serde::Serialize;
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};
    use std::time::Instant;

    #[derive(Debug)]
    struct Args {
        fixtures_dir: PathBuf,
        iterations: usize,
        frame_ms: u32,
        call_args: String,
        output: Option<PathBuf>,
    }

    #[derive(Debug, Clone, Copy)]
    struct Expected {
        result: AmdResult,
        cause: Option<AmdCause>,
    }

    #[derive(Debug, Clone, Serialize)]
    struct CaseResult {
        file: String,
        category: String,
        iteration: usize,
        latency_ms: f64,
        decision_ms: u64,
        frames: u64,
        verdict: String,
        expected: Option<String>,
        correct: Option<bool>,
    }

    #[derive(Debug, Clone, Serialize)]
    struct CategorySummary {
        category: String,
        runs: usize,
        p50_decision_ms: f64,
        p95_decision_ms: f64,
        avg_latency_ms: f64,
        accuracy: Option<f64>,
        not_sure_rate: f64,
    }

    #[derive(Debug, Clone, Serialize)]
    struct Summary {
        fixtures_dir: String,
        iterations: usize,
        frame_ms: u32,
        call_args: String,
        total_runs: usize,
        total_files: usize,
        p50_decision_ms: f64,
        p95_decision_ms: f64,
        p50_latency_ms: f64,
        p95_latency_ms: f64,
        accuracy: Option<f64>,
        not_sure_rate: f64,
        categories: Vec<CategorySummary>,
        cases: Vec<CaseResult>,
    }

    fn parse_args() -> Result<Args, String> {
        let mut fixtures_dir: Option<PathBuf> = None;
        let mut iterations: usize = 1;
        let mut frame_ms: u32 = 20;
        let mut call_args = String::new();
        let mut output: Option<PathBuf> = None;

        let mut it = std::env::args().skip(1);
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--fixtures" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --fixtures".into());
                    };
                    fixtures_dir = Some(PathBuf::from(v));
                }
                "--iterations" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --iterations".into());
                    };
                    iterations = v
                        .parse::<usize>()
                        .map_err(|_| "invalid value for --iterations".to_string())?
                        .clamp(1, 10);
                }
                "--frame-ms" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --frame-ms".into());
                    };
                    frame_ms = v
                        .parse::<u32>()
                        .ok()
                        .filter(|ms| *ms > 0)
                        .ok_or_else(|| "invalid value for --frame-ms".to_string())?;
                }
                "--args" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --args".into());
                    };
                    call_args = v;
                }
                "--output" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --output".into());
                    };
                    output = Some(PathBuf::from(v));
                }
                "--help" | "-h" => {
                    println!(
                        "Usage: cargo run -p amd-core --bin benchmark -- \\
  --fixtures <dir> [--iterations <n>] [--frame-ms <n>] [--args <overrides>] [--output <file.json>]"
                    );
                    std::process::exit(0);
                }
                other => {
                    return Err(format!("unknown argument: {other}"));
                }
            }
        }

        let fixtures_dir = fixtures_dir.unwrap_or_else(|| PathBuf::from("benchmarks/fixtures"));
        Ok(Args {
            fixtures_dir,
            iterations,
            frame_ms,
            call_args,
            output,
        })
    }

    fn collect_wavs(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), String> {
        let entries = std::fs::read_dir(dir).map_err(|e| e.to_string())?;
        for entry in entries {
            let entry = entry.map_err(|e| e.to_string())?;
            let path = entry.path();
            if path.is_dir() {
                collect_wavs(&path, out)?;
                continue;
            }
            let is_wav = path
                .extension()
                .and_then(|s| s.to_str())
                .map(|s| s.eq_ignore_ascii_case("wav"))
                .unwrap_or(false);
            if is_wav {
                out.push(path);
            }
        }
        Ok(())
    }

    fn category_for(path: &Path) -> String {
        let joined = path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_ascii_lowercase())
            .collect::<Vec<_>>()
            .join("/");
        if joined.contains("voicemail") || joined.contains("machine") {
            "machine".into()
        } else if joined.contains("human") || joined.contains("live") {
            "human".into()
        } else if joined.contains("silence") || joined.contains("dead") {
            "dead_air".into()
        } else if joined.contains("noisy") || joined.contains("noise") {
            "noisy_line".into()
        } else {
            "other".into()
        }
    }

    /// Sibling `.txt` holding `RESULT` or `RESULT/CAUSE`.
    fn expected_for(path: &Path) -> Result<Option<Expected>, String> {
        let Ok(raw) = std::fs::read_to_string(path.with_extension("txt")) else {
            return Ok(None);
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let (result, cause) = match raw.split_once('/') {
            Some((result, cause)) => (result, Some(cause)),
            None => (raw, None),
        };
        let result = result
            .parse::<AmdResult>()
            .map_err(|e| format!("{}: {e}", path.display()))?;
        let cause = cause
            .map(|c| c.parse::<AmdCause>())
            .transpose()
            .map_err(|e| format!("{}: {e}", path.display()))?;
        Ok(Some(Expected { result, cause }))
    }

    fn percentile(values: &[f64], p: f64) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        if sorted.len() == 1 {
            return sorted[0];
        }
        let idx = ((sorted.len() - 1) as f64 * p.clamp(0.0, 1.0)).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    fn ratio(hits: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    fn accuracy(rows: &[CaseResult]) -> Option<f64> {
        let judged = rows.iter().filter_map(|r| r.correct).collect::<Vec<_>>();
        if judged.is_empty() {
            return None;
        }
        Some(ratio(judged.iter().filter(|c| **c).count(), judged.len()))
    }

    fn not_sure_rate(rows: &[CaseResult]) -> f64 {
        let not_sure = rows
            .iter()
            .filter(|r| r.verdict.starts_with(AmdResult::NotSure.as_str()))
            .count();
        ratio(not_sure, rows.len())
    }

    fn summarize(category: String, rows: &[CaseResult]) -> CategorySummary {
        let decisions = rows.iter().map(|r| r.decision_ms as f64).collect::<Vec<_>>();
        let latencies = rows.iter().map(|r| r.latency_ms).collect::<Vec<_>>();
        CategorySummary {
            category,
            runs: rows.len(),
            p50_decision_ms: percentile(&decisions, 0.50),
            p95_decision_ms: percentile(&decisions, 0.95),
            avg_latency_ms: if latencies.is_empty() {
                0.0
            } else {
                latencies.iter().sum::<f64>() / latencies.len() as f64
            },
            accuracy: accuracy(rows),
            not_sure_rate: not_sure_rate(rows),
        }
    }

    let args = parse_args()?;
    if !args.fixtures_dir.exists() {
        return Err(format!(
            "fixtures directory not found: {}",
            args.fixtures_dir.display()
        ));
    }

    let mut wav_files = Vec::new();
    collect_wavs(&args.fixtures_dir, &mut wav_files)?;
    wav_files.sort();
    if wav_files.is_empty() {
        return Err(format!(
            "no .wav fixtures found in {}",
            args.fixtures_dir.display()
        ));
    }

    println!(
        "Running AMD benchmark on {} fixtures (iterations={}, frame={}ms)",
        wav_files.len(),
        args.iterations,
        args.frame_ms
    );

    let engine = AmdEngine::new(AmdParams::default());
    let mut cases = Vec::new();
    for wav in &wav_files {
        let expected = expected_for(wav)?;
        let category = category_for(wav);
        let file = wav
            .strip_prefix(&args.fixtures_dir)
            .unwrap_or(wav)
            .display()
            .to_string();

        for iteration in 1..=args.iterations {
            let mut source =
                WavFrameSource::open(wav, args.frame_ms).map_err(|e| format!("{file}: {e}"))?;
            let started = Instant::now();
            let report = engine
                .analyze(MemoryChannel::new(file.clone()), &mut source, &args.call_args)
                .map_err(|e| format!("{file}: {e}"))?;
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

            let correct = expected.map(|exp| {
                exp.result == report.verdict.result
                    && exp.cause.map_or(true, |c| c == report.verdict.cause)
            });
            cases.push(CaseResult {
                file: file.clone(),
                category: category.clone(),
                iteration,
                latency_ms,
                decision_ms: report.audio_ms,
                frames: report.frames,
                verdict: report.verdict.to_string(),
                expected: expected.map(|exp| match exp.cause {
                    Some(cause) => format!("{}/{cause}", exp.result),
                    None => exp.result.to_string(),
                }),
                correct,
            });
            println!(
                "{file} [{iteration}/{iters}] {verdict} after {decision} ms of audio ({latency:.2} ms)",
                iters = args.iterations,
                verdict = report.verdict,
                decision = report.audio_ms,
                latency = latency_ms
            );
        }
    }

    let mut grouped: BTreeMap<String, Vec<CaseResult>> = BTreeMap::new();
    for row in &cases {
        grouped
            .entry(row.category.clone())
            .or_default()
            .push(row.clone());
    }
    let categories = grouped
        .into_iter()
        .map(|(name, rows)| summarize(name, &rows))
        .collect::<Vec<_>>();

    let all_decisions = cases.iter().map(|r| r.decision_ms as f64).collect::<Vec<_>>();
    let all_latencies = cases.iter().map(|r| r.latency_ms).collect::<Vec<_>>();
    let summary = Summary {
        fixtures_dir: args.fixtures_dir.display().to_string(),
        iterations: args.iterations,
        frame_ms: args.frame_ms,
        call_args: args.call_args.clone(),
        total_runs: cases.len(),
        total_files: wav_files.len(),
        p50_decision_ms: percentile(&all_decisions, 0.50),
        p95_decision_ms: percentile(&all_decisions, 0.95),
        p50_latency_ms: percentile(&all_latencies, 0.50),
        p95_latency_ms: percentile(&all_latencies, 0.95),
        accuracy: accuracy(&cases),
        not_sure_rate: not_sure_rate(&cases),
        categories,
        cases,
    };

    println!(
        "Done. runs={} p50_decision={:.0}ms p95_decision={:.0}ms accuracy={}",
        summary.total_runs,
        summary.p50_decision_ms,
        summary.p95_decision_ms,
        summary
            .accuracy
            .map(|a| format!("{:.1}%", a * 100.0))
            .unwrap_or_else(|| "n/a".into())
    );

    let json = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
    if let Some(out) = args.output {
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        std::fs::write(&out, json).map_err(|e| e.to_string())?;
        println!("Wrote benchmark report: {}", out.display());
    } else {
        println!("{json}");
    }

    Ok(())
}
