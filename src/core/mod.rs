//! Signal-processing core.
//!
//! This module contains:
//! - Sample ingestion and counter loss detection
//! - Spectral band-power analysis and the online goal score
//! - Beat detection, BPM and HRV statistics
//! - State classification and display debouncing
//! - Session aggregation, scoring and report building

pub mod buffer;
pub mod cardiac;
pub mod ingest;
pub mod report;
pub mod session;
pub mod spectral;
pub mod state;

// Re-export commonly used types
pub use buffer::ChannelBuffer;
pub use cardiac::{
    BeatDetector, BpmDisplayFilter, CardiacExtractor, CardiacRequest, CardiacResponse, EcgWindow,
    HrvStat,
};
pub use ingest::{LossDetector, LossEvent};
pub use report::{ReportBuilder, SessionReport, PRODUCER_NAME, REPORT_VERSION};
pub use session::{
    SessionAggregator, SessionBand, SessionGoal, SessionLength, SessionSample, SessionSummary,
    SymmetryLabel,
};
pub use spectral::{
    Band, BandEdges, BandPowerEngine, BandPowerFrame, EegWindow, Goal, SpectralAnalyzer,
    SpectralRequest, SpectralResponse,
};
pub use state::{Debouncer, HrvRuleClassifier, State, StateClassifier, StateEvent};
