//! EEG band-power engine.
//!
//! Each EEG channel keeps a rolling window of the last `fft_size` samples.
//! Every `hop` samples, once the window is full, both windows are handed to
//! the spectral worker, which runs a Hann-windowed FFT, sums power per band
//! and smooths the result with an exponential moving average.

use crate::core::buffer::ChannelBuffer;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Added to the beta sum of the anxiety score.
pub const SCORE_EPSILON: f64 = 0.001;

/// The five EEG frequency bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    Delta,
    Theta,
    Alpha,
    Beta,
    Gamma,
}

impl Band {
    pub const ALL: [Band; 5] = [Band::Delta, Band::Theta, Band::Alpha, Band::Beta, Band::Gamma];

    pub fn as_str(&self) -> &'static str {
        match self {
            Band::Delta => "delta",
            Band::Theta => "theta",
            Band::Alpha => "alpha",
            Band::Beta => "beta",
            Band::Gamma => "gamma",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frequency range of each band in Hz, `[low, high)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandEdges {
    pub delta: (f64, f64),
    pub theta: (f64, f64),
    pub alpha: (f64, f64),
    pub beta: (f64, f64),
    pub gamma: (f64, f64),
}

impl Default for BandEdges {
    fn default() -> Self {
        Self {
            delta: (0.5, 4.0),
            theta: (4.0, 8.0),
            alpha: (8.0, 13.0),
            beta: (13.0, 30.0),
            gamma: (30.0, 100.0),
        }
    }
}

impl BandEdges {
    pub fn range(&self, band: Band) -> (f64, f64) {
        match band {
            Band::Delta => self.delta,
            Band::Theta => self.theta,
            Band::Alpha => self.alpha,
            Band::Beta => self.beta,
            Band::Gamma => self.gamma,
        }
    }
}

/// Power per band for one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BandPowerFrame {
    pub delta: f64,
    pub theta: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl BandPowerFrame {
    pub fn get(&self, band: Band) -> f64 {
        match band {
            Band::Delta => self.delta,
            Band::Theta => self.theta,
            Band::Alpha => self.alpha,
            Band::Beta => self.beta,
            Band::Gamma => self.gamma,
        }
    }

    fn set(&mut self, band: Band, value: f64) {
        match band {
            Band::Delta => self.delta = value,
            Band::Theta => self.theta = value,
            Band::Alpha => self.alpha = value,
            Band::Beta => self.beta = value,
            Band::Gamma => self.gamma = value,
        }
    }

    pub fn total(&self) -> f64 {
        self.delta + self.theta + self.alpha + self.beta + self.gamma
    }

    /// The band holding the most power. Ties go to the lower band.
    pub fn dominant(&self) -> Band {
        let mut best = Band::Delta;
        for band in Band::ALL {
            if self.get(band) > self.get(best) {
                best = band;
            }
        }
        best
    }
}

/// FFT-based power spectrum and band integration.
pub struct SpectralAnalyzer {
    fft_size: usize,
    sample_rate: f64,
    fft: Arc<dyn Fft<f64>>,
    window: Vec<f64>,
    buffer: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
}

impl SpectralAnalyzer {
    /// Create an analyzer for windows of `fft_size` samples at `sample_rate` Hz.
    pub fn new(fft_size: usize, sample_rate: f64) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch_len = fft.get_inplace_scratch_len();

        Self {
            fft_size,
            sample_rate,
            fft,
            window: hann_window(fft_size),
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Frequency resolution (Hz per bin).
    pub fn frequency_resolution(&self) -> f64 {
        self.sample_rate / self.fft_size as f64
    }

    /// One-sided power spectrum of the most recent `fft_size` samples.
    ///
    /// The mean is removed before windowing. Returns `None` when there are
    /// too few samples or any sample is not finite.
    pub fn compute_psd(&mut self, samples: &[f64]) -> Option<Vec<f64>> {
        if samples.len() < self.fft_size {
            return None;
        }
        let samples = &samples[samples.len() - self.fft_size..];
        if samples.iter().any(|s| !s.is_finite()) {
            return None;
        }

        let mean = samples.iter().sum::<f64>() / self.fft_size as f64;
        for (slot, (&s, &w)) in self
            .buffer
            .iter_mut()
            .zip(samples.iter().zip(self.window.iter()))
        {
            *slot = Complex::new((s - mean) * w, 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let n_freqs = self.fft_size / 2 + 1;
        let norm = 1.0 / (self.fft_size as f64).powi(2);

        Some(
            self.buffer[..n_freqs]
                .iter()
                .map(|c| c.norm_sqr() * norm)
                .collect(),
        )
    }

    /// Sum the bins whose centre frequency lies in `[low_hz, high_hz)`.
    pub fn band_power(&self, psd: &[f64], low_hz: f64, high_hz: f64) -> f64 {
        let resolution = self.frequency_resolution();
        psd.iter()
            .enumerate()
            .filter(|(k, _)| {
                let f = *k as f64 * resolution;
                f >= low_hz && f < high_hz
            })
            .map(|(_, p)| p)
            .sum()
    }

    /// Power in every band.
    pub fn band_powers(&self, psd: &[f64], edges: &BandEdges) -> BandPowerFrame {
        let mut frame = BandPowerFrame::default();
        for band in Band::ALL {
            let (low, high) = edges.range(band);
            frame.set(band, self.band_power(psd, low, high));
        }
        frame
    }
}

/// Hann window coefficients.
fn hann_window(size: usize) -> Vec<f64> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            let x = std::f64::consts::PI * 2.0 * i as f64 / (size - 1) as f64;
            0.5 * (1.0 - x.cos())
        })
        .collect()
}

/// Exponential smoothing of consecutive band-power frames.
#[derive(Debug, Clone)]
pub struct BandSmoother {
    factor: f64,
    state: Option<BandPowerFrame>,
}

impl BandSmoother {
    /// `factor` is the weight of the newest frame, in `(0, 1]`.
    pub fn new(factor: f64) -> Self {
        Self {
            factor: factor.clamp(f64::MIN_POSITIVE, 1.0),
            state: None,
        }
    }

    /// Fold a raw frame in. The first frame seeds the filter unchanged.
    pub fn smooth(&mut self, raw: &BandPowerFrame) -> BandPowerFrame {
        let next = match self.state {
            None => *raw,
            Some(prev) => {
                let mut out = BandPowerFrame::default();
                for band in Band::ALL {
                    let value =
                        prev.get(band) + self.factor * (raw.get(band) - prev.get(band));
                    out.set(band, value.max(0.0));
                }
                out
            }
        };
        self.state = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}

/// Windows sent to the spectral worker.
#[derive(Debug, Clone)]
pub struct SpectralRequest {
    pub eeg0: Vec<f64>,
    pub eeg1: Vec<f64>,
    pub sample_rate: f64,
    pub fft_size: usize,
}

/// Smoothed band powers of both channels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectralResponse {
    pub smooth0: BandPowerFrame,
    pub smooth1: BandPowerFrame,
}

/// Worker-side state: analyzer plus one smoother per channel.
pub struct BandPowerEngine {
    analyzer: SpectralAnalyzer,
    edges: BandEdges,
    smoothers: [BandSmoother; 2],
}

impl BandPowerEngine {
    pub fn new(fft_size: usize, sample_rate: f64, edges: BandEdges, smoothing: f64) -> Self {
        Self {
            analyzer: SpectralAnalyzer::new(fft_size, sample_rate),
            edges,
            smoothers: [BandSmoother::new(smoothing), BandSmoother::new(smoothing)],
        }
    }

    /// Analyse one pair of windows.
    ///
    /// Returns `None` if either window is short or contains non-finite data;
    /// the smoothers are left untouched in that case.
    pub fn process(&mut self, request: &SpectralRequest) -> Option<SpectralResponse> {
        if request.fft_size != self.analyzer.fft_size()
            || request.sample_rate != self.analyzer.sample_rate()
        {
            self.analyzer = SpectralAnalyzer::new(request.fft_size, request.sample_rate);
        }

        let psd0 = self.analyzer.compute_psd(&request.eeg0)?;
        let psd1 = self.analyzer.compute_psd(&request.eeg1)?;
        let raw0 = self.analyzer.band_powers(&psd0, &self.edges);
        let raw1 = self.analyzer.band_powers(&psd1, &self.edges);

        Some(SpectralResponse {
            smooth0: self.smoothers[0].smooth(&raw0),
            smooth1: self.smoothers[1].smooth(&raw1),
        })
    }
}

/// Orchestrator-side rolling windows of both EEG channels.
///
/// Both channels advance in lockstep so left/right frames stay aligned.
#[derive(Debug, Clone)]
pub struct EegWindow {
    left: ChannelBuffer,
    right: ChannelBuffer,
    sample_count: u64,
    hop: u64,
    sample_rate: f64,
}

impl EegWindow {
    pub fn new(fft_size: usize, hop: u64, sample_rate: f64) -> Self {
        Self {
            left: ChannelBuffer::new(fft_size),
            right: ChannelBuffer::new(fft_size),
            sample_count: 0,
            hop: hop.max(1),
            sample_rate,
        }
    }

    /// Push one sample per channel; yields a request every `hop` samples
    /// once both windows are full.
    pub fn push(&mut self, eeg0: f64, eeg1: f64) -> Option<SpectralRequest> {
        self.left.push(eeg0);
        self.right.push(eeg1);
        self.sample_count += 1;

        if self.sample_count % self.hop == 0 && self.left.is_full() && self.right.is_full() {
            Some(SpectralRequest {
                eeg0: self.left.to_vec(),
                eeg1: self.right.to_vec(),
                sample_rate: self.sample_rate,
                fft_size: self.left.capacity(),
            })
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn reset(&mut self) {
        self.left.clear();
        self.right.clear();
        self.sample_count = 0;
    }
}

/// Goal driving the online score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    Anxiety,
    Meditation,
    Sleep,
}

impl Goal {
    /// Score the latest smoothed frames of both channels.
    pub fn score(&self, left: &BandPowerFrame, right: &BandPowerFrame) -> f64 {
        match self {
            Goal::Anxiety => (left.alpha + right.alpha) / (left.beta + right.beta + SCORE_EPSILON),
            Goal::Meditation => (left.theta + right.theta) / 2.0,
            Goal::Sleep => (left.delta + right.delta) / 2.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Goal::Anxiety => "anxiety",
            Goal::Meditation => "meditation",
            Goal::Sleep => "sleep",
        }
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Goal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "anxiety" => Ok(Goal::Anxiety),
            "meditation" => Ok(Goal::Meditation),
            "sleep" => Ok(Goal::Sleep),
            other => Err(format!("unknown goal '{other}' (anxiety, meditation, sleep)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::synthetic::sine_wave;

    #[test]
    fn test_alpha_sine_dominates_alpha_band() {
        let signal = sine_wave(10.0, 1.0, 500.0, 256);
        let mut analyzer = SpectralAnalyzer::new(256, 500.0);
        let psd = analyzer.compute_psd(&signal).unwrap();
        let powers = analyzer.band_powers(&psd, &BandEdges::default());

        assert_eq!(powers.dominant(), Band::Alpha);
        assert!(powers.alpha > 10.0 * powers.delta);
        assert!(powers.alpha > 10.0 * powers.beta);
        assert!(powers.alpha > 10.0 * powers.gamma);
    }

    #[test]
    fn test_psd_rejects_short_or_nan_input() {
        let mut analyzer = SpectralAnalyzer::new(256, 500.0);
        assert!(analyzer.compute_psd(&[0.0; 100]).is_none());

        let mut signal = sine_wave(10.0, 1.0, 500.0, 256);
        signal[17] = f64::NAN;
        assert!(analyzer.compute_psd(&signal).is_none());
    }

    #[test]
    fn test_band_powers_are_non_negative() {
        let signal: Vec<f64> = (0..256).map(|i| ((i * 7919) % 13) as f64 - 6.0).collect();
        let mut analyzer = SpectralAnalyzer::new(256, 500.0);
        let psd = analyzer.compute_psd(&signal).unwrap();
        let powers = analyzer.band_powers(&psd, &BandEdges::default());
        for band in Band::ALL {
            assert!(powers.get(band) >= 0.0);
        }
    }

    #[test]
    fn test_smoother_seeds_then_moves_toward_input() {
        let mut smoother = BandSmoother::new(0.5);
        let first = BandPowerFrame {
            alpha: 2.0,
            ..Default::default()
        };
        assert_eq!(smoother.smooth(&first), first);

        let second = BandPowerFrame::default();
        let out = smoother.smooth(&second);
        assert!((out.alpha - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_window_emits_every_hop_once_full() {
        let mut window = EegWindow::new(256, 10, 500.0);
        let mut emitted_at = Vec::new();
        for i in 1..=300u64 {
            if window.push(0.0, 0.0).is_some() {
                emitted_at.push(i);
            }
        }
        assert_eq!(emitted_at, vec![260, 270, 280, 290, 300]);
    }

    #[test]
    fn test_window_request_carries_latest_samples() {
        let mut window = EegWindow::new(256, 10, 500.0);
        let mut last = None;
        for i in 0..260 {
            if let Some(req) = window.push(i as f64, -(i as f64)) {
                last = Some(req);
            }
        }
        let req = last.unwrap();
        assert_eq!(req.eeg0.len(), 256);
        assert_eq!(req.eeg0[0], 4.0);
        assert_eq!(req.eeg1[255], -259.0);
        assert_eq!(req.fft_size, 256);
    }

    #[test]
    fn test_window_reset_restarts_fill() {
        let mut window = EegWindow::new(256, 10, 500.0);
        for _ in 0..300 {
            window.push(1.0, 1.0);
        }
        assert_eq!(window.len(), 256);

        window.reset();
        assert!(window.is_empty());
        let first = (1..=300u64).find(|_| window.push(0.0, 0.0).is_some());
        assert_eq!(first, Some(260));
    }

    #[test]
    fn test_engine_end_to_end_alpha() {
        let mut window = EegWindow::new(256, 10, 500.0);
        let mut engine = BandPowerEngine::new(256, 500.0, BandEdges::default(), 0.3);
        let signal = sine_wave(10.0, 1.0, 500.0, 260);
        let mut response = None;
        for &s in &signal {
            if let Some(req) = window.push(s, 0.0) {
                response = engine.process(&req);
            }
        }
        let response = response.unwrap();
        let left = response.smooth0;
        assert!(left.alpha > left.delta && left.alpha > left.beta && left.alpha > left.gamma);
        assert_eq!(response.smooth1.total(), 0.0);
    }

    #[test]
    fn test_goal_scores() {
        let left = BandPowerFrame {
            delta: 1.0,
            theta: 2.0,
            alpha: 3.0,
            beta: 1.0,
            gamma: 0.0,
        };
        let right = BandPowerFrame {
            delta: 3.0,
            theta: 4.0,
            alpha: 1.0,
            beta: 1.0,
            gamma: 0.0,
        };
        assert!((Goal::Anxiety.score(&left, &right) - 4.0 / 2.001).abs() < 1e-12);
        assert_eq!(Goal::Meditation.score(&left, &right), 3.0);
        assert_eq!(Goal::Sleep.score(&left, &right), 2.0);

        let silent = BandPowerFrame::default();
        assert_eq!(Goal::Anxiety.score(&silent, &silent), 0.0);
    }

    #[test]
    fn test_goal_parsing() {
        assert_eq!("Sleep".parse::<Goal>(), Ok(Goal::Sleep));
        assert!("focus".parse::<Goal>().is_err());
    }
}
