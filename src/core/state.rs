//! Affective state classification and display debouncing.
//!
//! Every HRV batch is classified into a raw [`State`]. Raw states change
//! second to second, so the [`Debouncer`] turns them into a display state
//! that is a majority vote over the last few seconds and changes at most
//! once per interval.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Affective / mental state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Stressed,
    Relaxed,
    Happy,
    Focused,
    Neutral,
    MildStress,
    NoData,
}

impl State {
    pub const ALL: [State; 7] = [
        State::Stressed,
        State::Relaxed,
        State::Happy,
        State::Focused,
        State::Neutral,
        State::MildStress,
        State::NoData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            State::Stressed => "stressed",
            State::Relaxed => "relaxed",
            State::Happy => "happy",
            State::Focused => "focused",
            State::Neutral => "neutral",
            State::MildStress => "mild_stress",
            State::NoData => "no_data",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps an HRV triple to a state.
pub trait StateClassifier: Send {
    fn classify(&self, sdnn: f64, rmssd: f64, pnn50: f64) -> State;
}

impl<F> StateClassifier for F
where
    F: Fn(f64, f64, f64) -> State + Send,
{
    fn classify(&self, sdnn: f64, rmssd: f64, pnn50: f64) -> State {
        self(sdnn, rmssd, pnn50)
    }
}

/// Threshold rules over short-term HRV.
///
/// Low vagal tone (small RMSSD and SDNN) reads as stress, high RMSSD with
/// many large successive differences as relaxation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HrvRuleClassifier {
    pub stressed_rmssd: f64,
    pub stressed_sdnn: f64,
    pub mild_stress_rmssd: f64,
    pub relaxed_rmssd: f64,
    pub relaxed_pnn50: f64,
    pub happy_rmssd: f64,
    pub happy_pnn50: f64,
    pub focused_sdnn: (f64, f64),
    pub focused_pnn50: f64,
}

impl Default for HrvRuleClassifier {
    fn default() -> Self {
        Self {
            stressed_rmssd: 20.0,
            stressed_sdnn: 30.0,
            mild_stress_rmssd: 30.0,
            relaxed_rmssd: 60.0,
            relaxed_pnn50: 30.0,
            happy_rmssd: 45.0,
            happy_pnn50: 20.0,
            focused_sdnn: (40.0, 60.0),
            focused_pnn50: 20.0,
        }
    }
}

impl StateClassifier for HrvRuleClassifier {
    fn classify(&self, sdnn: f64, rmssd: f64, pnn50: f64) -> State {
        if !(sdnn.is_finite() && rmssd.is_finite() && pnn50.is_finite()) {
            return State::NoData;
        }
        if sdnn <= 0.0 && rmssd <= 0.0 {
            return State::NoData;
        }
        if rmssd < self.stressed_rmssd && sdnn < self.stressed_sdnn {
            return State::Stressed;
        }
        if rmssd < self.mild_stress_rmssd {
            return State::MildStress;
        }
        if rmssd > self.relaxed_rmssd && pnn50 > self.relaxed_pnn50 {
            return State::Relaxed;
        }
        if rmssd > self.happy_rmssd && pnn50 > self.happy_pnn50 {
            return State::Happy;
        }
        let (low, high) = self.focused_sdnn;
        if (low..=high).contains(&sdnn) && pnn50 < self.focused_pnn50 {
            return State::Focused;
        }
        State::Neutral
    }
}

/// A classified state stamped with its arrival time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEvent {
    pub raw_state: State,
    pub timestamp: DateTime<Utc>,
}

/// Majority-vote debouncer with a connection grace period.
#[derive(Debug, Clone)]
pub struct Debouncer {
    interval: Duration,
    connection_start: DateTime<Utc>,
    last_update: DateTime<Utc>,
    window: VecDeque<StateEvent>,
    display: State,
}

impl Debouncer {
    /// Create a debouncer whose grace period starts at `now`.
    pub fn new(interval: Duration, now: DateTime<Utc>) -> Self {
        Self {
            interval,
            connection_start: now,
            last_update: now,
            window: VecDeque::new(),
            display: State::NoData,
        }
    }

    /// Restart as on connect or disconnect.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.connection_start = now;
        self.last_update = now;
        self.window.clear();
        self.display = State::NoData;
    }

    /// Record a raw state and re-evaluate. Returns the new display state if
    /// it changed.
    pub fn observe(&mut self, event: StateEvent, now: DateTime<Utc>) -> Option<State> {
        self.window.push_back(event);
        self.evaluate(now)
    }

    /// Re-evaluate on a timer tick.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<State> {
        self.evaluate(now)
    }

    fn evaluate(&mut self, now: DateTime<Utc>) -> Option<State> {
        let cutoff = now - self.interval;
        while self.window.front().is_some_and(|e| e.timestamp < cutoff) {
            self.window.pop_front();
        }

        let previous = self.display;
        if now - self.connection_start < self.interval {
            self.display = State::NoData;
        } else if now - self.last_update >= self.interval {
            if let Some(mode) = mode(self.window.iter().map(|e| e.raw_state)) {
                self.display = mode;
                self.last_update = now;
            }
        }

        (self.display != previous).then_some(self.display)
    }

    pub fn display(&self) -> State {
        self.display
    }

    /// Raw states currently inside the vote window.
    pub fn window_len(&self) -> usize {
        self.window.len()
    }
}

/// Most frequent state; ties go to the state encountered first.
pub fn mode<I>(states: I) -> Option<State>
where
    I: IntoIterator<Item = State>,
{
    let mut counts: Vec<(State, usize)> = Vec::new();
    for state in states {
        match counts.iter_mut().find(|(s, _)| *s == state) {
            Some((_, n)) => *n += 1,
            None => counts.push((state, 1)),
        }
    }

    let mut best: Option<(State, usize)> = None;
    for (state, n) in counts {
        if best.map_or(true, |(_, b)| n > b) {
            best = Some((state, n));
        }
    }
    best.map(|(state, _)| state)
}
