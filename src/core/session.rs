//! Session aggregation and end-of-session scoring.
//!
//! A session is `idle -> active -> summarized -> idle`. While active, every
//! band-power frame pair is folded into one [`SessionSample`]; on stop the
//! record is frozen, reduced to a [`SessionSummary`] and discarded.

use crate::core::spectral::{BandPowerFrame, SCORE_EPSILON};
use crate::error::PipelineError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Keeps session percentages finite when every band is silent.
const PERCENT_EPSILON: f64 = 1e-12;

/// Selectable session lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub enum SessionLength {
    Three,
    Five,
    Ten,
    Fifteen,
}

impl SessionLength {
    pub fn from_minutes(minutes: u64) -> Result<Self, PipelineError> {
        match minutes {
            3 => Ok(SessionLength::Three),
            5 => Ok(SessionLength::Five),
            10 => Ok(SessionLength::Ten),
            15 => Ok(SessionLength::Fifteen),
            other => Err(PipelineError::InvalidSessionLength(other)),
        }
    }

    pub fn minutes(&self) -> u64 {
        match self {
            SessionLength::Three => 3,
            SessionLength::Five => 5,
            SessionLength::Ten => 10,
            SessionLength::Fifteen => 15,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.minutes() as i64)
    }
}

impl TryFrom<u64> for SessionLength {
    type Error = PipelineError;

    fn try_from(minutes: u64) -> Result<Self, Self::Error> {
        Self::from_minutes(minutes)
    }
}

impl From<SessionLength> for u64 {
    fn from(length: SessionLength) -> u64 {
        length.minutes()
    }
}

impl FromStr for SessionLength {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let minutes: u64 = s
            .trim()
            .trim_end_matches("min")
            .trim()
            .parse()
            .map_err(|_| format!("invalid session length '{s}'"))?;
        Self::from_minutes(minutes).map_err(|e| e.to_string())
    }
}

/// Goal whose weight table drives the weighted EEG score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionGoal {
    Meditation,
    Relaxation,
    Focus,
    Sleep,
}

impl SessionGoal {
    /// `(alpha, beta, theta, delta)` weights.
    pub fn weights(&self) -> BandAverages {
        let (alpha, beta, theta, delta) = match self {
            SessionGoal::Meditation => (0.4, 0.0, 0.6, 0.0),
            SessionGoal::Relaxation => (0.7, 0.0, 0.3, 0.0),
            SessionGoal::Focus => (0.2, 0.8, 0.0, 0.0),
            SessionGoal::Sleep => (0.0, 0.0, 0.0, 1.0),
        };
        BandAverages {
            alpha,
            beta,
            theta,
            delta,
            symmetry: 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionGoal::Meditation => "meditation",
            SessionGoal::Relaxation => "relaxation",
            SessionGoal::Focus => "focus",
            SessionGoal::Sleep => "sleep",
        }
    }
}

impl fmt::Display for SessionGoal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionGoal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "meditation" => Ok(SessionGoal::Meditation),
            "relaxation" => Ok(SessionGoal::Relaxation),
            "focus" => Ok(SessionGoal::Focus),
            "sleep" => Ok(SessionGoal::Sleep),
            other => Err(format!(
                "unknown session goal '{other}' (meditation, relaxation, focus, sleep)"
            )),
        }
    }
}

/// One entry of the session record: hemisphere-averaged band powers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionSample {
    pub timestamp: DateTime<Utc>,
    pub alpha: f64,
    pub beta: f64,
    pub theta: f64,
    pub delta: f64,
    /// `|alpha0 - alpha1|`
    pub symmetry: f64,
}

impl SessionSample {
    pub fn from_frames(
        timestamp: DateTime<Utc>,
        left: &BandPowerFrame,
        right: &BandPowerFrame,
    ) -> Self {
        Self {
            timestamp,
            alpha: (left.alpha + right.alpha) / 2.0,
            beta: (left.beta + right.beta) / 2.0,
            theta: (left.theta + right.theta) / 2.0,
            delta: (left.delta + right.delta) / 2.0,
            symmetry: (left.alpha - right.alpha).abs(),
        }
    }
}

/// Per-band means over a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BandAverages {
    pub alpha: f64,
    pub beta: f64,
    pub theta: f64,
    pub delta: f64,
    pub symmetry: f64,
}

/// Bands scored at the end of a session, in tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionBand {
    Alpha,
    Beta,
    Theta,
    Delta,
}

impl SessionBand {
    pub const ORDER: [SessionBand; 4] = [
        SessionBand::Alpha,
        SessionBand::Beta,
        SessionBand::Theta,
        SessionBand::Delta,
    ];

    fn of(&self, averages: &BandAverages) -> f64 {
        match self {
            SessionBand::Alpha => averages.alpha,
            SessionBand::Beta => averages.beta,
            SessionBand::Theta => averages.theta,
            SessionBand::Delta => averages.delta,
        }
    }

    /// Mental-state label associated with a dominant band.
    pub fn mental_state(&self) -> &'static str {
        match self {
            SessionBand::Alpha => "Relaxed",
            SessionBand::Beta => "Focused",
            SessionBand::Theta => "Meditation",
            SessionBand::Delta => "Drowsy",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SessionBand::Alpha => {
                "Your mind was in a calm and relaxed state, ideal for meditation."
            }
            SessionBand::Beta => {
                "Your mind was highly alert or active. Try to slow down your breath to enter a calmer state."
            }
            SessionBand::Theta => "You entered a deeply meditative state. Excellent work.",
            SessionBand::Delta => {
                "Your brain was in a very slow-wave state, indicating deep rest or sleepiness."
            }
        }
    }
}

/// Share of total power per mental state, in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatePercentages {
    pub relaxed: f64,
    pub focused: f64,
    pub meditation: f64,
    pub drowsy: f64,
}

impl StatePercentages {
    pub fn sum(&self) -> f64 {
        self.relaxed + self.focused + self.meditation + self.drowsy
    }
}

/// Hemispheric balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymmetryLabel {
    Balanced,
    LeftDominant,
    RightDominant,
}

impl SymmetryLabel {
    pub fn from_average(symmetry: f64, threshold: f64) -> Self {
        if symmetry.abs() < threshold {
            SymmetryLabel::Balanced
        } else if symmetry > 0.0 {
            SymmetryLabel::LeftDominant
        } else {
            SymmetryLabel::RightDominant
        }
    }
}

/// Band integer scores shown as bars.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DominantBands {
    pub alpha: i64,
    pub beta: i64,
    pub theta: i64,
    pub delta: i64,
}

/// End-of-session result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub goal: SessionGoal,
    pub sample_count: usize,
    pub averages: BandAverages,
    pub total_power: f64,
    pub state_percentages: StatePercentages,
    pub good_meditation_pct: f64,
    pub most_frequent: SessionBand,
    pub mental_state: String,
    pub state_description: String,
    pub focus_score: f64,
    pub avg_symmetry: f64,
    pub symmetry_label: SymmetryLabel,
    pub dominant_bands: DominantBands,
    /// Seconds between the first and last recorded sample
    pub duration_secs: f64,
    pub formatted_duration: String,
    pub weighted_eeg_score: f64,
}

/// Humanize a span: whole seconds under a minute, whole minutes otherwise.
pub fn format_duration(elapsed_ms: i64) -> String {
    let ms = elapsed_ms.max(0) as f64;
    if ms < 60_000.0 {
        format!("{} sec", (ms / 1000.0).round() as i64)
    } else {
        format!("{} min", (ms / 60_000.0).round() as i64)
    }
}

/// Reduce a frozen record to a summary. An empty record yields `None`.
pub fn summarize(
    record: &[SessionSample],
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    goal: SessionGoal,
    symmetry_threshold: f64,
) -> Option<SessionSummary> {
    let (first, last) = (record.first()?, record.last()?);
    let n = record.len() as f64;

    let mut averages = BandAverages::default();
    for s in record {
        averages.alpha += s.alpha;
        averages.beta += s.beta;
        averages.theta += s.theta;
        averages.delta += s.delta;
        averages.symmetry += s.symmetry;
    }
    averages.alpha /= n;
    averages.beta /= n;
    averages.theta /= n;
    averages.delta /= n;
    averages.symmetry /= n;

    let total_power = averages.alpha + averages.beta + averages.theta + averages.delta;
    let denominator = total_power + PERCENT_EPSILON;
    let state_percentages = StatePercentages {
        relaxed: averages.alpha / denominator * 100.0,
        focused: averages.beta / denominator * 100.0,
        meditation: averages.theta / denominator * 100.0,
        drowsy: averages.delta / denominator * 100.0,
    };
    let good_meditation_pct = (averages.alpha + averages.theta) / denominator * 100.0;

    let mut most_frequent = SessionBand::Alpha;
    for band in SessionBand::ORDER {
        if band.of(&averages) > most_frequent.of(&averages) {
            most_frequent = band;
        }
    }

    let weights = goal.weights();
    let weighted_eeg_score = weights.alpha * averages.alpha
        + weights.beta * averages.beta
        + weights.theta * averages.theta
        + weights.delta * averages.delta;

    let elapsed_ms = (last.timestamp - first.timestamp).num_milliseconds();

    Some(SessionSummary {
        started_at,
        ended_at,
        goal,
        sample_count: record.len(),
        averages,
        total_power,
        state_percentages,
        good_meditation_pct,
        most_frequent,
        mental_state: most_frequent.mental_state().to_string(),
        state_description: most_frequent.description().to_string(),
        focus_score: (averages.alpha + averages.theta) / (averages.beta + SCORE_EPSILON),
        avg_symmetry: averages.symmetry,
        symmetry_label: SymmetryLabel::from_average(averages.symmetry, symmetry_threshold),
        dominant_bands: DominantBands {
            alpha: (averages.alpha * 1000.0).round() as i64,
            beta: (averages.beta * 1000.0).round() as i64,
            theta: (averages.theta * 1000.0).round() as i64,
            delta: (averages.delta * 1000.0).round() as i64,
        },
        duration_secs: elapsed_ms as f64 / 1000.0,
        formatted_duration: format_duration(elapsed_ms),
        weighted_eeg_score,
    })
}

/// Where the aggregator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Active {
        started_at: DateTime<Utc>,
        length: SessionLength,
        goal: SessionGoal,
    },
}

/// Owns the in-progress session record.
#[derive(Debug, Clone)]
pub struct SessionAggregator {
    phase: SessionPhase,
    record: Vec<SessionSample>,
    symmetry_threshold: f64,
    last_summary: Option<SessionSummary>,
}

impl SessionAggregator {
    pub fn new(symmetry_threshold: f64) -> Self {
        Self {
            phase: SessionPhase::Idle,
            record: Vec::new(),
            symmetry_threshold,
            last_summary: None,
        }
    }

    /// Begin a new session at `now`, clearing any previous record.
    pub fn start(
        &mut self,
        now: DateTime<Utc>,
        length: SessionLength,
        goal: SessionGoal,
    ) -> Result<(), PipelineError> {
        if self.is_active() {
            return Err(PipelineError::SessionActive);
        }
        self.record.clear();
        self.phase = SessionPhase::Active {
            started_at: now,
            length,
            goal,
        };
        info!(minutes = length.minutes(), %goal, "session started");
        Ok(())
    }

    /// Append a frame pair if a session is active.
    pub fn record(&mut self, now: DateTime<Utc>, left: &BandPowerFrame, right: &BandPowerFrame) {
        if self.is_active() {
            self.record.push(SessionSample::from_frames(now, left, right));
        }
    }

    /// Whether the active session has run its full length by `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.phase {
            SessionPhase::Active {
                started_at, length, ..
            } => now - started_at >= length.duration(),
            SessionPhase::Idle => false,
        }
    }

    /// Freeze the record and summarize it.
    ///
    /// Returns `Ok(None)` for a session without samples.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Result<Option<SessionSummary>, PipelineError> {
        let SessionPhase::Active {
            started_at, goal, ..
        } = self.phase
        else {
            return Err(PipelineError::NoActiveSession);
        };
        self.phase = SessionPhase::Idle;

        let frozen: Vec<SessionSample> = std::mem::take(&mut self.record)
            .into_iter()
            .filter(|s| s.timestamp >= started_at)
            .collect();

        let summary = summarize(&frozen, started_at, now, goal, self.symmetry_threshold);
        match &summary {
            Some(s) => info!(
                samples = s.sample_count,
                dominant = s.mental_state.as_str(),
                "session summarized"
            ),
            None => debug!("session stopped without samples"),
        }
        if summary.is_some() {
            self.last_summary = summary.clone();
        }
        Ok(summary)
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, SessionPhase::Active { .. })
    }

    pub fn record_len(&self) -> usize {
        self.record.len()
    }

    /// Most recent summary, kept until the next one replaces it.
    pub fn last_summary(&self) -> Option<&SessionSummary> {
        self.last_summary.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn frame(alpha: f64, beta: f64, theta: f64, delta: f64) -> BandPowerFrame {
        BandPowerFrame {
            delta,
            theta,
            alpha,
            beta,
            gamma: 0.0,
        }
    }

    fn sample(offset_ms: i64, base: DateTime<Utc>, a: f64, b: f64, t: f64, d: f64) -> SessionSample {
        SessionSample {
            timestamp: base + Duration::milliseconds(offset_ms),
            alpha: a,
            beta: b,
            theta: t,
            delta: d,
            symmetry: 0.0,
        }
    }

    #[test]
    fn test_sample_averages_hemispheres() {
        let now = Utc::now();
        let s = SessionSample::from_frames(now, &frame(2.0, 1.0, 0.5, 0.2), &frame(1.0, 3.0, 0.5, 0.4));
        assert_eq!(s.alpha, 1.5);
        assert_eq!(s.beta, 2.0);
        assert!((s.delta - 0.3).abs() < 1e-12);
        assert_eq!(s.symmetry, 1.0);
    }

    #[test]
    fn test_summary_values() {
        let base = Utc::now();
        let record = vec![
            sample(0, base, 4.0, 2.0, 1.0, 1.0),
            sample(30_000, base, 2.0, 2.0, 3.0, 1.0),
        ];
        let summary =
            summarize(&record, base, base + Duration::seconds(31), SessionGoal::Meditation, 0.05)
                .unwrap();

        assert_eq!(summary.averages.alpha, 3.0);
        assert_eq!(summary.total_power, 8.0);
        assert!((summary.state_percentages.relaxed - 37.5).abs() < 1e-6);
        assert!((summary.state_percentages.sum() - 100.0).abs() < 0.5);
        assert!((summary.good_meditation_pct - 62.5).abs() < 1e-6);
        assert_eq!(summary.most_frequent, SessionBand::Alpha);
        assert_eq!(summary.mental_state, "Relaxed");
        assert!((summary.focus_score - 5.0 / 2.001).abs() < 1e-9);
        assert!((summary.weighted_eeg_score - (0.4 * 3.0 + 0.6 * 2.0)).abs() < 1e-9);
        assert_eq!(summary.formatted_duration, "30 sec");
        assert_eq!(summary.duration_secs, 30.0);
        assert_eq!(summary.symmetry_label, SymmetryLabel::Balanced);
        assert_eq!(
            summary.dominant_bands,
            DominantBands {
                alpha: 3000,
                beta: 2000,
                theta: 2000,
                delta: 1000
            }
        );
    }

    #[test]
    fn test_most_frequent_tie_prefers_alpha_then_beta() {
        let base = Utc::now();
        let record = vec![sample(0, base, 1.0, 1.0, 1.0, 1.0)];
        let summary = summarize(&record, base, base, SessionGoal::Focus, 0.05).unwrap();
        assert_eq!(summary.most_frequent, SessionBand::Alpha);

        let record = vec![sample(0, base, 0.5, 2.0, 2.0, 1.0)];
        let summary = summarize(&record, base, base, SessionGoal::Focus, 0.05).unwrap();
        assert_eq!(summary.most_frequent, SessionBand::Beta);
    }

    #[test]
    fn test_percentages_sum_to_100() {
        let base = Utc::now();
        for (a, b, t, d) in [(1e-6, 3e-6, 2e-7, 5e-6), (10.0, 0.1, 3.3, 0.0), (0.2, 0.2, 0.2, 0.2)] {
            let record = vec![sample(0, base, a, b, t, d)];
            let summary = summarize(&record, base, base, SessionGoal::Sleep, 0.05).unwrap();
            assert!((summary.state_percentages.sum() - 100.0).abs() <= 0.5);
        }
    }

    #[test]
    fn test_silent_session_stays_finite() {
        let base = Utc::now();
        let record = vec![sample(0, base, 0.0, 0.0, 0.0, 0.0)];
        let summary = summarize(&record, base, base, SessionGoal::Meditation, 0.05).unwrap();
        assert_eq!(summary.state_percentages.sum(), 0.0);
        assert_eq!(summary.focus_score, 0.0);
        assert!(summary.good_meditation_pct.is_finite());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0 sec");
        assert_eq!(format_duration(45_400), "45 sec");
        assert_eq!(format_duration(60_000), "1 min");
        assert_eq!(format_duration(170_000), "3 min");
    }

    #[test]
    fn test_symmetry_label() {
        assert_eq!(SymmetryLabel::from_average(0.01, 0.05), SymmetryLabel::Balanced);
        assert_eq!(SymmetryLabel::from_average(0.2, 0.05), SymmetryLabel::LeftDominant);
        assert_eq!(SymmetryLabel::from_average(-0.2, 0.05), SymmetryLabel::RightDominant);
    }

    #[test]
    fn test_lifecycle() {
        let base = Utc::now();
        let mut aggregator = SessionAggregator::new(0.05);
        let f = frame(1.0, 1.0, 1.0, 1.0);

        aggregator.record(base, &f, &f);
        assert_eq!(aggregator.record_len(), 0);

        aggregator
            .start(base, SessionLength::Three, SessionGoal::Meditation)
            .unwrap();
        assert!(matches!(
            aggregator.start(base, SessionLength::Three, SessionGoal::Meditation),
            Err(PipelineError::SessionActive)
        ));

        for i in 0..10 {
            aggregator.record(base + Duration::milliseconds(i * 20), &f, &f);
        }
        assert!(!aggregator.is_expired(base + Duration::minutes(2)));
        assert!(aggregator.is_expired(base + Duration::minutes(3)));

        let summary = aggregator.stop(base + Duration::minutes(3)).unwrap().unwrap();
        assert_eq!(summary.sample_count, 10);
        assert!(!aggregator.is_active());
        assert!(aggregator.last_summary().is_some());
        assert!(matches!(
            aggregator.stop(base),
            Err(PipelineError::NoActiveSession)
        ));
    }

    #[test]
    fn test_samples_before_start_are_excluded() {
        let base = Utc::now();
        let mut aggregator = SessionAggregator::new(0.05);
        aggregator
            .start(base, SessionLength::Five, SessionGoal::Focus)
            .unwrap();
        let f = frame(1.0, 1.0, 1.0, 1.0);
        aggregator.record(base - Duration::milliseconds(40), &f, &f);
        aggregator.record(base + Duration::milliseconds(20), &f, &f);

        let summary = aggregator.stop(base + Duration::seconds(1)).unwrap().unwrap();
        assert_eq!(summary.sample_count, 1);
    }

    #[test]
    fn test_empty_session_has_no_summary() {
        let base = Utc::now();
        let mut aggregator = SessionAggregator::new(0.05);
        aggregator
            .start(base, SessionLength::Ten, SessionGoal::Sleep)
            .unwrap();
        assert_eq!(aggregator.stop(base + Duration::seconds(5)).unwrap(), None);
        assert!(aggregator.last_summary().is_none());
    }

    #[test]
    fn test_session_length_parsing() {
        assert_eq!(SessionLength::from_minutes(10).unwrap(), SessionLength::Ten);
        assert!(SessionLength::from_minutes(7).is_err());
        assert_eq!("15min".parse::<SessionLength>(), Ok(SessionLength::Fifteen));
        let json = serde_json::to_string(&SessionLength::Five).unwrap();
        assert_eq!(json, "5");
        assert!(serde_json::from_str::<SessionLength>("4").is_err());
    }
}
