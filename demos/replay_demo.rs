//! Demonstration of the biostream pipeline on a synthetic recording.
//!
//! This example shows how to:
//! 1. Start a collector on a synthetic sample source
//! 2. Connect the orchestrator and start a session
//! 3. Feed samples and react to pipeline events
//! 4. Summarize the session and build a report
//!
//! Run with: cargo run --example replay_demo

use biostream_agent::{
    collector::{Collector, CollectorConfig, SyntheticConfig, SyntheticSource},
    core::{ReportBuilder, SessionGoal, SessionLength},
    runtime::{Orchestrator, PipelineEvent, SampleClock},
    telemetry::create_shared_log,
    Config,
};
use chrono::Utc;
use std::time::Duration;

fn main() {
    println!("Biostream Agent - Replay Demo");
    println!("=============================");
    println!();

    let config = Config::default();
    let sample_rate = config.stream.sample_rate;
    let log = create_shared_log();
    let mut orchestrator = Orchestrator::new(config, log.clone());

    // 30 seconds of alpha-dominant EEG and a 68 BPM heart, losing a sample
    // every 4 seconds.
    let mut collector = Collector::new(CollectorConfig::default());
    let source = SyntheticSource::new(SyntheticConfig {
        heart_rate_bpm: 68.0,
        drop_every: Some(2000),
        total_samples: Some(30 * 500),
        ..Default::default()
    });

    let start = Utc::now();
    let mut clock = SampleClock::new(start, sample_rate);
    orchestrator.connect(start).expect("Failed to spawn workers");
    orchestrator
        .start_session(start, SessionLength::Three, SessionGoal::Meditation)
        .expect("Failed to start session");
    collector.start(source).expect("Failed to start collector");

    for sample in collector.receiver().iter() {
        let now = clock.tick();
        if let Err(e) = orchestrator.handle_sample(sample, now) {
            eprintln!("Pipeline error: {e}");
            break;
        }
        if clock.samples() % 500 == 0 {
            let _ = orchestrator.tick(now);
        }

        for event in orchestrator.take_events() {
            match event {
                PipelineEvent::SampleLoss { counter, missing, .. } => {
                    println!("  loss before counter {counter}: {missing:?} missing");
                }
                PipelineEvent::Cardiac {
                    displayed_bpm,
                    stats,
                    ..
                } => {
                    println!(
                        "  heart: {:?} BPM (display {:?}), SDNN {:.1} ms, RMSSD {:.1} ms",
                        stats.bpm.map(|b| b.round()),
                        displayed_bpm.map(|b| b.round()),
                        stats.sdnn,
                        stats.rmssd
                    );
                }
                PipelineEvent::DisplayState { state, .. } => {
                    println!("  display state -> {state}");
                }
                _ => {}
            }
        }
    }

    let now = clock.now();
    let _ = orchestrator.settle(now, Duration::from_secs(2));
    println!();

    match orchestrator.stop_session(now) {
        Ok(Some(summary)) => {
            println!("Session summary");
            println!("---------------");
            println!("  Duration: {}", summary.formatted_duration);
            println!("  Mental state: {}", summary.mental_state);
            println!("  {}", summary.state_description);
            println!("  Good meditation: {:.1}%", summary.good_meditation_pct);
            println!("  Focus score: {:.2}", summary.focus_score);
            println!();

            let builder = ReportBuilder::new();
            let report = builder.build(&summary);
            match builder.to_json(&report) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("Error serializing report: {e}"),
            }
        }
        Ok(None) => println!("Session recorded no samples"),
        Err(e) => eprintln!("Error stopping session: {e}"),
    }

    orchestrator.shutdown();
    println!();
    println!("{}", log.summary());
}
