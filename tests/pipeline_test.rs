//! End-to-end tests: collector thread feeding the threaded orchestrator.

use biostream_agent::collector::{
    Collector, CollectorConfig, ReplaySource, SyntheticConfig, SyntheticSource,
};
use biostream_agent::core::{ReportBuilder, SessionGoal, SessionLength, State};
use biostream_agent::runtime::{Orchestrator, PipelineEvent, SampleClock};
use biostream_agent::telemetry::create_shared_log;
use biostream_agent::{Config, Sample};
use chrono::{Duration, Utc};
use std::io::Cursor;

const SETTLE: std::time::Duration = std::time::Duration::from_secs(5);

/// Drain `collector` through `orchestrator`, ticking once per second of
/// sample time. Returns every event emitted.
fn drive(
    orchestrator: &mut Orchestrator,
    collector: &Collector,
    clock: &mut SampleClock,
) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    for sample in collector.receiver().iter() {
        let now = clock.tick();
        orchestrator.handle_sample(sample, now).unwrap();
        if clock.samples() % 500 == 0 {
            orchestrator.tick(now).unwrap();
        }
        events.extend(orchestrator.take_events());
    }
    orchestrator.settle(clock.now(), SETTLE).unwrap();
    orchestrator.tick(clock.now()).unwrap();
    events.extend(orchestrator.take_events());
    events
}

#[test]
fn test_synthetic_stream_end_to_end() {
    let start = Utc::now();
    let log = create_shared_log();
    let mut orchestrator = Orchestrator::new(Config::default(), log.clone());
    orchestrator.connect(start).unwrap();
    orchestrator
        .start_session(start, SessionLength::Three, SessionGoal::Meditation)
        .unwrap();

    let mut collector = Collector::new(CollectorConfig::default());
    collector
        .start(SyntheticSource::new(SyntheticConfig {
            total_samples: Some(10 * 500),
            drop_every: Some(1000),
            ..Default::default()
        }))
        .unwrap();

    let mut clock = SampleClock::new(start, 500.0);
    let mut events = drive(&mut orchestrator, &collector, &mut clock);
    orchestrator.stop_session(clock.now()).unwrap();
    events.extend(orchestrator.take_events());

    let losses = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::SampleLoss { .. }))
        .count();
    assert_eq!(losses, 4);

    let bpm: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Cardiac { stats, .. } => stats.bpm,
            _ => None,
        })
        .collect();
    assert!(!bpm.is_empty());

    let summary = events
        .iter()
        .find_map(|e| match e {
            PipelineEvent::SessionSummary { summary } => Some(summary.clone()),
            _ => None,
        })
        .expect("session summary");
    assert_eq!(summary.mental_state, "Relaxed");
    assert!(summary.good_meditation_pct > 50.0);

    let stats = log.stats();
    assert_eq!(stats.samples_ingested, 10 * 500 - 4);
    assert_eq!(stats.sessions_completed, 1);
    assert!(stats.raw_states > 0);
}

#[test]
fn test_display_state_held_back_during_grace_period() {
    let start = Utc::now();
    let mut orchestrator = Orchestrator::new(Config::default(), create_shared_log())
        .with_classifier(|| Box::new(|_: f64, _: f64, _: f64| State::Focused));
    orchestrator.connect(start).unwrap();

    let mut collector = Collector::new(CollectorConfig::default());
    collector
        .start(SyntheticSource::new(SyntheticConfig {
            total_samples: Some(12 * 500),
            ..Default::default()
        }))
        .unwrap();

    let mut clock = SampleClock::new(start, 500.0);
    let events = drive(&mut orchestrator, &collector, &mut clock);

    let changes: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::DisplayState { timestamp, state } => Some((*timestamp, *state)),
            _ => None,
        })
        .collect();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].1, State::Focused);
    assert!(changes[0].0 - start >= Duration::seconds(5));
}

#[test]
fn test_replay_with_counter_gap() {
    let mut csv = String::from("# counter,eeg0,eeg1,ecg\n");
    for counter in (0u64..300).filter(|c| *c != 42) {
        csv.push_str(&format!("{},0.1,0.1,0.0\n", counter % 256));
    }

    let start = Utc::now();
    let mut orchestrator = Orchestrator::new(Config::default(), create_shared_log());
    orchestrator.connect(start).unwrap();
    let mut clock = SampleClock::new(start, 500.0);

    let mut events = Vec::new();
    for sample in ReplaySource::new(Cursor::new(csv)) {
        orchestrator.handle_sample(sample, clock.tick()).unwrap();
        events.extend(orchestrator.take_events());
    }

    let gaps: Vec<(u64, u64, Option<u64>)> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::SampleLoss {
                previous,
                counter,
                missing,
                ..
            } => Some((*previous, *counter, *missing)),
            _ => None,
        })
        .collect();
    assert_eq!(gaps, vec![(41, 43, Some(1))]);
}

#[test]
fn test_reconnect_starts_fresh() {
    let start = Utc::now();
    let mut orchestrator = Orchestrator::new(Config::default(), create_shared_log());
    orchestrator.connect(start).unwrap();
    let mut clock = SampleClock::new(start, 500.0);

    for sample in SyntheticSource::new(SyntheticConfig {
        total_samples: Some(3000),
        ..Default::default()
    }) {
        orchestrator.handle_sample(sample, clock.tick()).unwrap();
    }
    orchestrator.settle(clock.now(), SETTLE).unwrap();
    assert!(orchestrator.displayed_bpm().is_some());

    orchestrator.disconnect(clock.now()).unwrap();
    orchestrator.connect(clock.now()).unwrap();
    orchestrator.take_events();

    // One sample short of the first cardiac batch.
    for i in 0..499u64 {
        orchestrator
            .handle_sample(Sample::new(i % 256, 0.0, 0.0, 0.0), clock.tick())
            .unwrap();
    }
    orchestrator.settle(clock.now(), SETTLE).unwrap();

    let events = orchestrator.take_events();
    assert!(events
        .iter()
        .all(|e| !matches!(e, PipelineEvent::Cardiac { .. })));
    assert_eq!(orchestrator.displayed_bpm(), None);
    assert_eq!(orchestrator.display_state(), State::NoData);
}

#[test]
fn test_report_from_pipeline_summary() {
    let start = Utc::now();
    let mut orchestrator = Orchestrator::new(Config::default(), create_shared_log());
    orchestrator.connect(start).unwrap();
    orchestrator
        .start_session(start, SessionLength::Five, SessionGoal::Focus)
        .unwrap();

    let mut clock = SampleClock::new(start, 500.0);
    for sample in SyntheticSource::new(SyntheticConfig {
        total_samples: Some(2000),
        ..Default::default()
    }) {
        orchestrator.handle_sample(sample, clock.tick()).unwrap();
    }
    orchestrator.settle(clock.now(), SETTLE).unwrap();
    let summary = orchestrator.stop_session(clock.now()).unwrap().unwrap();

    let builder = ReportBuilder::new();
    let report = builder.build(&summary);
    let json = builder.to_json(&report).unwrap();
    assert!(json.contains("\"goal\": \"focus\""));
    assert_eq!(report.summary, summary);
}
