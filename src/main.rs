//! Biostream Agent CLI
//!
//! Runs the EEG/ECG pipeline over a recorded or synthetic sample stream and
//! prints pipeline events as JSON lines.

use anyhow::{Context, Result};
use biostream_agent::{
    collector::{
        Collector, CollectorConfig, ReplaySource, Sample, SyntheticConfig, SyntheticSource,
    },
    config::Config,
    core::{spectral::Goal, ReportBuilder, SessionGoal, SessionLength, State},
    runtime::{Orchestrator, SampleClock},
    telemetry::create_shared_log_with_persistence,
    VERSION,
};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "biostream")]
#[command(version = VERSION)]
#[command(about = "Real-time EEG/ECG indicators from a wearable sample stream", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recording (`counter,eeg0,eeg1,ecg` per line)
    Run {
        /// Input file; reads stdin when omitted or `-`
        input: Option<PathBuf>,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Run on a synthetic stream
    Simulate {
        /// Stream length in seconds
        #[arg(long, default_value = "60")]
        seconds: u64,

        /// Heart rate of the synthetic ECG
        #[arg(long, default_value = "75")]
        heart_rate: f64,

        /// Dominant EEG rhythm in Hz
        #[arg(long, default_value = "10")]
        eeg_freq: f64,

        /// Drop one sample every N samples
        #[arg(long)]
        drop_every: Option<u64>,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Show configuration
    Config,

    /// List the affective states
    States,
}

#[derive(Args)]
struct PipelineArgs {
    /// Deliver samples at the nominal rate instead of as fast as possible
    #[arg(long)]
    realtime: bool,

    /// Start a session of this many minutes (3, 5, 10 or 15)
    #[arg(long)]
    session: Option<u64>,

    /// Session goal (meditation, relaxation, focus, sleep)
    #[arg(long)]
    session_goal: Option<SessionGoal>,

    /// Online goal (anxiety, meditation, sleep)
    #[arg(long)]
    goal: Option<Goal>,

    /// Write the session report to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Only print display-state changes, cardiac batches and session events
    #[arg(long)]
    quiet: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { input, pipeline } => {
            let source: Box<dyn Iterator<Item = Sample> + Send> = match input {
                Some(path) if path.as_os_str() != "-" => Box::new(
                    ReplaySource::open(&path)
                        .with_context(|| format!("opening recording {}", path.display()))?,
                ),
                _ => Box::new(ReplaySource::new(BufReader::new(std::io::stdin()))),
            };
            cmd_stream(source, pipeline)
        }
        Commands::Simulate {
            seconds,
            heart_rate,
            eeg_freq,
            drop_every,
            pipeline,
        } => {
            let config = load_config();
            let total = (seconds as f64 * config.stream.sample_rate).round() as u64;
            let source = SyntheticSource::new(SyntheticConfig {
                sample_rate: config.stream.sample_rate,
                eeg_freq_hz: eeg_freq,
                heart_rate_bpm: heart_rate,
                counter_modulus: config.stream.counter_modulus,
                drop_every,
                total_samples: Some(total),
                ..Default::default()
            });
            cmd_stream(Box::new(source), pipeline)
        }
        Commands::Config => cmd_config(),
        Commands::States => {
            for state in State::ALL {
                println!("{state}");
            }
            Ok(())
        }
    }
}

/// Logs go to stderr so stdout stays a clean event stream.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "using default configuration");
            Config::default()
        }
    }
}

fn cmd_stream(source: Box<dyn Iterator<Item = Sample> + Send>, args: PipelineArgs) -> Result<()> {
    let config = load_config();
    if let Err(e) = config.ensure_directories() {
        warn!(error = %e, "could not create data directory");
    }
    info!(version = VERSION, "biostream agent starting");

    let log = create_shared_log_with_persistence(config.data_path.join("pipeline_stats.json"));
    let sample_rate = config.stream.sample_rate;
    let session = match args.session {
        Some(minutes) => Some(SessionLength::from_minutes(minutes)?),
        None => None,
    };
    let session_goal = args.session_goal.unwrap_or(config.session.default_goal);

    let mut orchestrator = Orchestrator::new(config, log.clone());
    if let Some(goal) = args.goal {
        orchestrator.set_goal(goal);
    }

    let mut collector = Collector::new(CollectorConfig {
        realtime_rate: args.realtime.then_some(sample_rate),
    });

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let start = Utc::now();
    let mut clock = SampleClock::new(start, sample_rate);
    let mut now = start;
    let mut last_tick = start;

    orchestrator.connect(start)?;
    if let Some(length) = session {
        orchestrator.start_session(start, length, session_goal)?;
    }
    collector.start(source)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let receiver = collector.receiver().clone();

    while running.load(Ordering::SeqCst) {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(sample) => {
                now = if args.realtime { Utc::now() } else { clock.tick() };
                orchestrator.handle_sample(sample, now)?;
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if args.realtime {
                    now = Utc::now();
                }
                orchestrator.poll(now)?;
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }

        if now - last_tick >= chrono::Duration::seconds(1) {
            orchestrator.tick(now)?;
            last_tick = now;
        }
        emit(&mut orchestrator, &mut out, args.quiet)?;
    }

    collector.stop();
    orchestrator.settle(now, Duration::from_secs(2))?;
    if orchestrator.session_active() {
        orchestrator.stop_session(now)?;
    }
    orchestrator.disconnect(now)?;
    emit(&mut orchestrator, &mut out, args.quiet)?;
    out.flush()?;

    if let (Some(path), Some(summary)) = (&args.report, orchestrator.last_summary()) {
        write_report(path, &ReportBuilder::new(), summary, now)?;
    }

    orchestrator.shutdown();
    if let Err(e) = log.save() {
        warn!(error = %e, "could not save pipeline stats");
    }
    eprintln!();
    eprintln!("{}", log.summary());
    Ok(())
}

fn emit(orchestrator: &mut Orchestrator, out: &mut impl Write, quiet: bool) -> Result<()> {
    for event in orchestrator.take_events() {
        if quiet && matches!(event.name(), "band_power" | "raw_state") {
            continue;
        }
        writeln!(out, "{}", serde_json::to_string(&event)?)?;
    }
    Ok(())
}

fn write_report(
    path: &Path,
    builder: &ReportBuilder,
    summary: &biostream_agent::SessionSummary,
    now: DateTime<Utc>,
) -> Result<()> {
    let report = builder.build_at(summary, now);
    let json = builder.to_json(&report)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json).with_context(|| format!("writing report {}", path.display()))?;
    info!(path = %path.display(), session = report.session_id.as_str(), "session report written");
    Ok(())
}

fn cmd_config() -> Result<()> {
    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");
}
