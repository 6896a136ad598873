//! Biostream Agent - real-time EEG/ECG indicators from a wearable stream.
//!
//! This library turns a 500 Hz stream of `(counter, eeg0, eeg1, ecg)`
//! samples into band-power composition per hemisphere, heart rate, HRV
//! statistics, a debounced affective state and an end-of-session summary.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Biostream Agent                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌──────────────────────────────────────────┐    │
//! │  │ Collector │──▶│ Orchestrator (loss detector, windows,    │    │
//! │  │ (replay / │   │ BPM filter, debouncer, session)          │    │
//! │  │ synthetic)│   └──────┬─────────────┬─────────────┬───────┘    │
//! │  └───────────┘          ▼             ▼             ▲            │
//! │                  ┌───────────┐  ┌───────────┐  ┌───────────┐     │
//! │                  │ Spectral  │  │  Cardiac  │─▶│Classifier │     │
//! │                  │  worker   │  │  worker   │  │  worker   │     │
//! │                  └───────────┘  └───────────┘  └───────────┘     │
//! │                                                                  │
//! │  ┌───────────┐                          ┌──────────────────┐     │
//! │  │ Pipeline  │                          │  Session report  │     │
//! │  │    Log    │                          │                  │     │
//! │  └───────────┘                          └──────────────────┘     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use biostream_agent::collector::{SyntheticConfig, SyntheticSource};
//! use biostream_agent::runtime::{Orchestrator, SampleClock};
//! use biostream_agent::{telemetry, Config};
//! use chrono::Utc;
//!
//! let start = Utc::now();
//! let mut orchestrator = Orchestrator::new(Config::default(), telemetry::create_shared_log());
//! orchestrator.connect(start).expect("failed to spawn workers");
//!
//! let mut clock = SampleClock::new(start, 500.0);
//! let source = SyntheticSource::new(SyntheticConfig {
//!     total_samples: Some(5_000),
//!     ..Default::default()
//! });
//! for sample in source {
//!     orchestrator.handle_sample(sample, clock.tick()).expect("pipeline stopped");
//! }
//! for event in orchestrator.take_events() {
//!     println!("{}", event.name());
//! }
//! ```

pub mod collector;
pub mod config;
pub mod core;
pub mod error;
pub mod runtime;
pub mod telemetry;

// Re-export key types at crate root for convenience
pub use collector::{Collector, CollectorConfig, Sample};
pub use config::{Config, ConfigError};
pub use core::{ReportBuilder, SessionReport, SessionSummary, State, StateClassifier};
pub use error::PipelineError;
pub use runtime::{Orchestrator, PipelineEvent, SampleClock};
pub use telemetry::{PipelineLog, PipelineStats, SharedPipelineLog};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
