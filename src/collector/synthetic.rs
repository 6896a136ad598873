//! Synthetic biosignal generator.
//!
//! Produces an alpha-rhythm EEG pair and an impulse-train ECG so the whole
//! pipeline can run without a device.

use crate::collector::types::Sample;
use std::f64::consts::PI;

/// Half-width of a synthetic QRS complex, in samples.
const QRS_HALF_WIDTH: usize = 6;

/// `len` samples of `amplitude * sin(2π f t)` at `sample_rate` Hz.
pub fn sine_wave(freq_hz: f64, amplitude: f64, sample_rate: f64, len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| amplitude * (2.0 * PI * freq_hz * i as f64 / sample_rate).sin())
        .collect()
}

/// Value of a triangular QRS pulse `distance` samples away from its apex.
fn qrs_shape(distance: usize) -> f64 {
    if distance > QRS_HALF_WIDTH {
        0.0
    } else {
        1.0 - distance as f64 / (QRS_HALF_WIDTH + 1) as f64
    }
}

/// An ECG-like trace with a triangular R-peak every `60 / bpm` seconds,
/// the first apex at sample `first_beat`.
pub fn ecg_pulse_train(bpm: f64, sample_rate: f64, len: usize, first_beat: usize) -> Vec<f64> {
    let spacing = (sample_rate * 60.0 / bpm).round().max(1.0) as usize;
    (0..len)
        .map(|i| ecg_value(i as u64, spacing as u64, first_beat as u64))
        .collect()
}

fn ecg_value(index: u64, spacing: u64, first_beat: u64) -> f64 {
    if index + (QRS_HALF_WIDTH as u64) < first_beat {
        return 0.0;
    }
    // Distance to the nearest apex at first_beat + k * spacing.
    let shifted = (index + spacing - first_beat % spacing) % spacing;
    let distance = shifted.min(spacing - shifted) as usize;
    qrs_shape(distance)
}

/// Parameters of the synthetic stream.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub sample_rate: f64,
    /// Dominant EEG rhythm (Hz)
    pub eeg_freq_hz: f64,
    pub left_amplitude: f64,
    pub right_amplitude: f64,
    pub heart_rate_bpm: f64,
    /// Counter wraparound modulus
    pub counter_modulus: Option<u64>,
    /// Skip one sample every `drop_every` samples, to exercise loss detection
    pub drop_every: Option<u64>,
    /// Stop after this many samples; `None` runs forever
    pub total_samples: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            sample_rate: 500.0,
            eeg_freq_hz: 10.0,
            left_amplitude: 1.0,
            right_amplitude: 0.8,
            heart_rate_bpm: 75.0,
            counter_modulus: Some(256),
            drop_every: None,
            total_samples: None,
        }
    }
}

/// Iterator of synthetic samples.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    config: SyntheticConfig,
    spacing: u64,
    index: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let spacing = (config.sample_rate * 60.0 / config.heart_rate_bpm)
            .round()
            .max(1.0) as u64;
        Self {
            config,
            spacing,
            index: 0,
        }
    }

    fn sample_at(&self, index: u64) -> Sample {
        let t = index as f64 / self.config.sample_rate;
        let phase = 2.0 * PI * self.config.eeg_freq_hz * t;
        let counter = match self.config.counter_modulus {
            Some(m) => index % m,
            None => index,
        };
        Sample::new(
            counter,
            self.config.left_amplitude * phase.sin(),
            self.config.right_amplitude * phase.sin(),
            ecg_value(index, self.spacing, self.spacing / 4),
        )
    }
}

impl Iterator for SyntheticSource {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        loop {
            if let Some(total) = self.config.total_samples {
                if self.index >= total {
                    return None;
                }
            }
            let index = self.index;
            self.index += 1;

            let dropped = self
                .config
                .drop_every
                .is_some_and(|n| n > 0 && index > 0 && index % n == 0);
            if !dropped {
                return Some(self.sample_at(index));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pulse_train_apex_positions() {
        let ecg = ecg_pulse_train(75.0, 500.0, 2500, 100);
        let apexes: Vec<usize> = ecg
            .iter()
            .enumerate()
            .filter(|(_, v)| **v == 1.0)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(apexes, vec![100, 500, 900, 1300, 1700, 2100]);
        assert_eq!(ecg[0], 0.0);
        assert!(ecg[103] > 0.0 && ecg[103] < 1.0);
    }

    #[test]
    fn test_synthetic_counter_wraps() {
        let source = SyntheticSource::new(SyntheticConfig {
            total_samples: Some(300),
            ..Default::default()
        });
        let samples: Vec<Sample> = source.collect();
        assert_eq!(samples.len(), 300);
        assert_eq!(samples[255].counter, 255);
        assert_eq!(samples[256].counter, 0);
    }

    #[test]
    fn test_synthetic_drops() {
        let source = SyntheticSource::new(SyntheticConfig {
            total_samples: Some(100),
            drop_every: Some(10),
            ..Default::default()
        });
        let counters: Vec<u64> = source.map(|s| s.counter).collect();
        assert_eq!(counters.len(), 91);
        assert_eq!(&counters[8..11], &[8, 9, 11]);
    }
}
