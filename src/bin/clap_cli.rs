use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use clap_engine::config::{DetectorConfig, Tunable};
use clap_engine::testing::{read_wav, replay, write_wav, ReplayReport, SignalBuilder};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "clap_cli",
    about = "Offline replay, simulation and live listening for the clap detector"
)]
struct Cli {
    /// JSON configuration file (missing keys fall back to defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override a parameter, e.g. --set amplitude_threshold=0.1 (repeatable)
    #[arg(long = "set", value_name = "NAME=VALUE", global = true)]
    overrides: Vec<String>,
    /// Log detector internals to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a WAV file through the detector on a virtual clock
    Replay {
        #[arg(long)]
        wav: PathBuf,
        /// Write the JSON report here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
        /// Exit with status 2 unless exactly this many claps are confirmed
        #[arg(long)]
        expect_claps: Option<usize>,
    },
    /// Synthesise a signal from a script and run it through the detector
    ///
    /// Script items, comma separated: quiet:<frames> | quiet:<ms>ms |
    /// clap[:amplitude] | soft[:amplitude] | tone:<frames>[:amplitude]
    Simulate {
        #[arg(long)]
        script: String,
        #[arg(long, default_value_t = 48_000)]
        sample_rate: u32,
        #[arg(long, default_value_t = 1)]
        seed: u64,
        /// Also save the synthesised signal as a WAV file
        #[arg(long)]
        write_wav: Option<PathBuf>,
        #[arg(long)]
        expect_claps: Option<usize>,
    },
    /// Print the effective configuration as JSON
    Defaults,
    /// List runtime-tunable parameter names
    Tunables,
    /// Listen on the default input device and print events as JSON lines
    #[cfg(feature = "cpal")]
    Listen {
        /// Stop after this many seconds
        #[arg(long, default_value_t = 30)]
        seconds: u64,
    },
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = load_config(cli.config.as_deref(), &cli.overrides)?;

    match cli.command {
        Commands::Replay {
            wav,
            output,
            expect_claps,
        } => run_replay(&wav, config, output, expect_claps),
        Commands::Simulate {
            script,
            sample_rate,
            seed,
            write_wav,
            expect_claps,
        } => run_simulate(&script, sample_rate, seed, config, write_wav, expect_claps),
        Commands::Defaults => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::from(0))
        }
        Commands::Tunables => {
            for tunable in Tunable::ALL {
                println!("{tunable}");
            }
            Ok(ExitCode::from(0))
        }
        #[cfg(feature = "cpal")]
        Commands::Listen { seconds } => run_listen(config, seconds),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(path: Option<&Path>, overrides: &[String]) -> Result<DetectorConfig> {
    let mut config = match path {
        Some(path) => DetectorConfig::load_from_file(path),
        None => DetectorConfig::default(),
    };

    for item in overrides {
        let (name, value) = item
            .split_once('=')
            .ok_or_else(|| anyhow!("override '{item}' is not NAME=VALUE"))?;
        let tunable: Tunable = name.trim().parse()?;
        let value: f64 = value
            .trim()
            .parse()
            .with_context(|| format!("parsing value for {name}"))?;
        config.apply(tunable, value)?;
    }
    Ok(config)
}

fn run_replay(
    wav: &Path,
    config: DetectorConfig,
    output: Option<PathBuf>,
    expect_claps: Option<usize>,
) -> Result<ExitCode> {
    let clip = read_wav(wav)?;
    let report = replay(&clip.samples, clip.sample_rate, config)
        .with_context(|| format!("replaying {}", wav.display()))?;

    emit_report(&wav.display().to_string(), &report, output)?;
    Ok(check_expectation(&report, expect_claps))
}

fn run_simulate(
    script: &str,
    sample_rate: u32,
    seed: u64,
    config: DetectorConfig,
    wav_path: Option<PathBuf>,
    expect_claps: Option<usize>,
) -> Result<ExitCode> {
    let builder = SignalBuilder::new(sample_rate, config.capture.frame_size, seed);
    let samples = apply_script(builder, script)?.build();

    if let Some(path) = wav_path {
        write_wav(&path, &samples, sample_rate)?;
    }

    let report = replay(&samples, sample_rate, config)?;
    emit_report("simulated", &report, None)?;
    Ok(check_expectation(&report, expect_claps))
}

fn apply_script(mut builder: SignalBuilder, script: &str) -> Result<SignalBuilder> {
    for item in script.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let mut parts = item.split(':');
        let kind = parts.next().unwrap_or_default();
        let arg = parts.next();
        let extra = parts.next();

        builder = match (kind, arg) {
            ("quiet", Some(arg)) => match arg.strip_suffix("ms") {
                Some(ms) => builder.quiet_for(Duration::from_millis(
                    ms.parse().with_context(|| format!("in '{item}'"))?,
                )),
                None => builder.quiet(arg.parse().with_context(|| format!("in '{item}'"))?),
            },
            ("clap", amplitude) => builder.clap(parse_amplitude(amplitude, 0.8, item)?),
            ("soft", amplitude) => builder.soft_clap(parse_amplitude(amplitude, 0.5, item)?),
            ("tone", Some(frames)) => {
                let frames = frames.parse().with_context(|| format!("in '{item}'"))?;
                builder.tone(220.0, parse_amplitude(extra, 0.3, item)?, frames)
            }
            _ => bail!("unrecognised script item '{item}'"),
        };
    }
    Ok(builder)
}

fn parse_amplitude(value: Option<&str>, default: f32, item: &str) -> Result<f32> {
    match value {
        None => Ok(default),
        Some(value) => {
            let amplitude: f32 = value.parse().with_context(|| format!("in '{item}'"))?;
            if !(0.0..=1.0).contains(&amplitude) {
                bail!("amplitude in '{item}' must be within 0..=1");
            }
            Ok(amplitude)
        }
    }
}

fn check_expectation(report: &ReplayReport, expect_claps: Option<usize>) -> ExitCode {
    match expect_claps {
        Some(expected) if report.confirmed() != expected => {
            eprintln!(
                "expected {} confirmed claps, detected {}",
                expected,
                report.confirmed()
            );
            ExitCode::from(2)
        }
        _ => ExitCode::from(0),
    }
}

#[derive(Serialize)]
struct ReportPayload<'a> {
    source: &'a str,
    confirmed: usize,
    weak: usize,
    #[serde(flatten)]
    report: &'a ReplayReport,
}

fn emit_report(source: &str, report: &ReplayReport, output_path: Option<PathBuf>) -> Result<()> {
    let payload = ReportPayload {
        source,
        confirmed: report.confirmed(),
        weak: report.weak(),
        report,
    };
    let json = serde_json::to_string_pretty(&payload)?;

    if let Some(path) = output_path {
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    } else {
        println!("{json}");
    }
    Ok(())
}

#[cfg(feature = "cpal")]
fn run_listen(config: DetectorConfig, seconds: u64) -> Result<ExitCode> {
    use clap_engine::engine::{ClapCallbacks, ClapDetector, CpalBackend};
    use std::sync::Arc;

    let print = |kind: &'static str| {
        move || {
            let line = serde_json::json!({ "event": kind });
            println!("{line}");
        }
    };

    let detector = ClapDetector::builder(Arc::new(CpalBackend::new()))
        .config(config)
        .callbacks(
            ClapCallbacks::new()
                .on_clap_confirmed(print("confirmed"))
                .on_weak_clap(print("weak")),
        )
        .build()?;

    detector.start().context("starting capture")?;
    eprintln!("Listening for {seconds}s...");
    std::thread::sleep(Duration::from_secs(seconds));
    detector.stop()?;
    Ok(ExitCode::from(0))
}
