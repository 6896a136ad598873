//! ECG beat detection, heart rate and HRV statistics.
//!
//! The orchestrator keeps a 5-second ECG window and, once per second of new
//! data, hands a copy to the cardiac worker. The worker locates R-peaks,
//! derives RR intervals and reduces them to BPM, SDNN, RMSSD and pNN50. It
//! also tracks running extremes and averages since the connection started.
//!
//! Missing readings stay `None` all the way to the consumer: 0 BPM looks
//! like a valid value and must never stand in for "no reading".

use crate::config::CardiacConfig;
use crate::core::buffer::ChannelBuffer;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::VecDeque;

/// Successive RR differences above this count towards pNN50.
const NN50_THRESHOLD_MS: f64 = 50.0;

/// ECG window sent to the cardiac worker.
#[derive(Debug, Clone)]
pub struct CardiacRequest {
    pub ecg_buffer: Vec<f64>,
    pub sample_rate: f64,
}

/// Statistics of one detection window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HrvStat {
    /// 60 / mean RR, `None` with fewer than two beats
    pub bpm: Option<f64>,
    /// Standard deviation of RR intervals (ms)
    pub sdnn: f64,
    /// Root mean square of successive RR differences (ms)
    pub rmssd: f64,
    /// Percentage of successive differences above 50 ms
    pub pnn50: f64,
    /// Latest RR interval (ms), clamped to the configured range
    pub hrv: Option<f64>,
}

/// Full worker response for one ECG batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardiacResponse {
    pub bpm: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub avg: Option<f64>,
    pub hrv: Option<f64>,
    pub hrv_high: Option<f64>,
    pub hrv_low: Option<f64>,
    pub hrv_avg: Option<f64>,
    pub sdnn: f64,
    pub rmssd: f64,
    pub pnn50: f64,
    /// Beat positions within the analysed window
    pub peaks: Vec<usize>,
    /// One clamped HRV value per detected beat pair
    pub hrv_series: Vec<f64>,
}

/// Threshold-and-refractory R-peak detector.
#[derive(Debug, Clone)]
pub struct BeatDetector {
    refractory_samples: usize,
    threshold_ratio: f64,
}

impl BeatDetector {
    pub fn new(sample_rate: f64, refractory_secs: f64, threshold_ratio: f64) -> Self {
        Self {
            refractory_samples: (refractory_secs * sample_rate).round().max(1.0) as usize,
            threshold_ratio,
        }
    }

    /// Locate beats as local maxima above a fraction of the window maximum.
    ///
    /// Two candidates closer than the refractory period collapse into the
    /// larger one. Returns ordered sample indices.
    pub fn detect(&self, signal: &[f64]) -> Vec<usize> {
        let n = signal.len();
        if n < 3 || signal.iter().any(|x| !x.is_finite()) {
            return Vec::new();
        }

        let mean = signal.iter().sum::<f64>() / n as f64;
        let centered: Vec<f64> = signal.iter().map(|x| x - mean).collect();
        let peak = centered.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if peak <= 0.0 {
            return Vec::new();
        }
        let threshold = self.threshold_ratio * peak;

        let mut beats: Vec<usize> = Vec::new();
        for i in 1..n - 1 {
            let x = centered[i];
            if x < threshold || x < centered[i - 1] || x <= centered[i + 1] {
                continue;
            }
            match beats.last_mut() {
                Some(last) if i - *last < self.refractory_samples => {
                    if x > centered[*last] {
                        *last = i;
                    }
                }
                _ => beats.push(i),
            }
        }
        beats
    }
}

/// RR intervals in ms between consecutive beats, keeping only plausible ones.
pub fn rr_intervals_ms(beats: &[usize], sample_rate: f64, min_ms: f64, max_ms: f64) -> Vec<f64> {
    beats
        .windows(2)
        .map(|pair| (pair[1] - pair[0]) as f64 * 1000.0 / sample_rate)
        .filter(|rr| (min_ms..=max_ms).contains(rr))
        .collect()
}

/// Reduce an RR sequence to BPM and HRV statistics.
pub fn hrv_stat(rr_ms: &[f64], hrv_clamp_ms: f64) -> HrvStat {
    if rr_ms.is_empty() {
        return HrvStat::default();
    }

    let mean_rr = rr_ms.iter().mean();
    let bpm = (mean_rr > 0.0).then(|| 60_000.0 / mean_rr);

    let sdnn = if rr_ms.len() >= 2 {
        rr_ms.iter().population_std_dev()
    } else {
        0.0
    };

    let diffs: Vec<f64> = rr_ms.windows(2).map(|w| w[1] - w[0]).collect();
    let (rmssd, pnn50) = if diffs.is_empty() {
        (0.0, 0.0)
    } else {
        let rmssd = (diffs.iter().map(|d| d * d).sum::<f64>() / diffs.len() as f64).sqrt();
        let nn50 = diffs.iter().filter(|d| d.abs() > NN50_THRESHOLD_MS).count();
        (rmssd, nn50 as f64 * 100.0 / diffs.len() as f64)
    };

    HrvStat {
        bpm,
        sdnn,
        rmssd,
        pnn50,
        hrv: rr_ms.last().map(|rr| clamp_hrv(*rr, hrv_clamp_ms)),
    }
}

/// Clamp an HRV value to `[0, max_ms]`. NaN maps to 0.
pub fn clamp_hrv(value: f64, max_ms: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, max_ms)
    }
}

/// Running high / low / average of a series.
#[derive(Debug, Clone, Copy, Default)]
struct RunningStat {
    high: Option<f64>,
    low: Option<f64>,
    sum: f64,
    count: u64,
}

impl RunningStat {
    fn update(&mut self, value: f64) {
        self.high = Some(self.high.map_or(value, |h| h.max(value)));
        self.low = Some(self.low.map_or(value, |l| l.min(value)));
        self.sum += value;
        self.count += 1;
    }

    fn avg(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Worker-side state: detector plus statistics since connection.
#[derive(Debug, Clone)]
pub struct CardiacExtractor {
    detector: BeatDetector,
    sample_rate: f64,
    refractory_secs: f64,
    threshold_ratio: f64,
    min_rr_ms: f64,
    max_rr_ms: f64,
    hrv_clamp_ms: f64,
    bpm_stats: RunningStat,
    hrv_stats: RunningStat,
}

impl CardiacExtractor {
    pub fn new(sample_rate: f64, config: &CardiacConfig) -> Self {
        let refractory_secs = config.refractory.as_secs_f64();
        Self {
            detector: BeatDetector::new(sample_rate, refractory_secs, config.threshold_ratio),
            sample_rate,
            refractory_secs,
            threshold_ratio: config.threshold_ratio,
            min_rr_ms: config.min_rr_ms,
            max_rr_ms: config.max_rr_ms,
            hrv_clamp_ms: config.hrv_clamp_ms,
            bpm_stats: RunningStat::default(),
            hrv_stats: RunningStat::default(),
        }
    }

    /// Analyse one ECG window.
    pub fn process(&mut self, request: &CardiacRequest) -> CardiacResponse {
        if request.sample_rate != self.sample_rate && request.sample_rate > 0.0 {
            self.sample_rate = request.sample_rate;
            self.detector =
                BeatDetector::new(self.sample_rate, self.refractory_secs, self.threshold_ratio);
        }

        let peaks = self.detector.detect(&request.ecg_buffer);
        let rr = rr_intervals_ms(&peaks, self.sample_rate, self.min_rr_ms, self.max_rr_ms);
        let stat = hrv_stat(&rr, self.hrv_clamp_ms);
        let hrv_series: Vec<f64> = rr
            .iter()
            .map(|&v| clamp_hrv(v, self.hrv_clamp_ms))
            .collect();

        if let Some(bpm) = stat.bpm {
            self.bpm_stats.update(bpm);
        }
        if let Some(hrv) = stat.hrv {
            self.hrv_stats.update(hrv);
        }

        CardiacResponse {
            bpm: stat.bpm,
            high: self.bpm_stats.high,
            low: self.bpm_stats.low,
            avg: self.bpm_stats.avg(),
            hrv: stat.hrv,
            hrv_high: self.hrv_stats.high,
            hrv_low: self.hrv_stats.low,
            hrv_avg: self.hrv_stats.avg(),
            sdnn: stat.sdnn,
            rmssd: stat.rmssd,
            pnn50: stat.pnn50,
            peaks,
            hrv_series,
        }
    }
}

impl CardiacResponse {
    /// The per-window statistics fed to the state classifier.
    pub fn stat(&self) -> HrvStat {
        HrvStat {
            bpm: self.bpm,
            sdnn: self.sdnn,
            rmssd: self.rmssd,
            pnn50: self.pnn50,
            hrv: self.hrv,
        }
    }
}

/// Orchestrator-side rolling ECG window.
#[derive(Debug, Clone)]
pub struct EcgWindow {
    buffer: ChannelBuffer,
    sample_count: u64,
    batch: u64,
    sample_rate: f64,
}

impl EcgWindow {
    pub fn new(capacity: usize, batch: u64, sample_rate: f64) -> Self {
        Self {
            buffer: ChannelBuffer::new(capacity),
            sample_count: 0,
            batch: batch.max(1),
            sample_rate,
        }
    }

    /// Push one ECG sample; yields the current window after every `batch`
    /// new samples.
    pub fn push(&mut self, ecg: f64) -> Option<CardiacRequest> {
        self.buffer.push(ecg);
        self.sample_count += 1;

        (self.sample_count % self.batch == 0).then(|| CardiacRequest {
            ecg_buffer: self.buffer.to_vec(),
            sample_rate: self.sample_rate,
        })
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.sample_count = 0;
    }
}

/// Rate-limited BPM shown to the user.
///
/// Averages the last few readings and moves the displayed value toward that
/// average by at most `max_step` per update.
#[derive(Debug, Clone)]
pub struct BpmDisplayFilter {
    window: VecDeque<f64>,
    size: usize,
    max_step: f64,
    displayed: Option<f64>,
}

impl BpmDisplayFilter {
    pub fn new(size: usize, max_step: f64) -> Self {
        Self {
            window: VecDeque::with_capacity(size),
            size: size.max(1),
            max_step,
            displayed: None,
        }
    }

    /// Feed one raw reading. A missing reading clears the filter.
    pub fn update(&mut self, bpm: Option<f64>) -> Option<f64> {
        let Some(bpm) = bpm.filter(|b| b.is_finite()) else {
            self.reset();
            return None;
        };

        self.window.push_back(bpm);
        if self.window.len() > self.size {
            self.window.pop_front();
        }
        let target = self.window.iter().sum::<f64>() / self.window.len() as f64;

        let next = match self.displayed {
            None => target,
            Some(current) => {
                let diff = target - current;
                current + diff.signum() * diff.abs().min(self.max_step)
            }
        };
        self.displayed = Some(next);
        Some(next)
    }

    pub fn displayed(&self) -> Option<f64> {
        self.displayed
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.displayed = None;
    }
}
