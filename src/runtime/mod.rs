//! Threaded runtime: analysis workers and the orchestrator that drives them.

pub mod clock;
pub mod orchestrator;
pub mod worker;

pub use clock::SampleClock;
pub use orchestrator::{ClassifierFactory, Orchestrator, PipelineEvent};
pub use worker::Worker;
