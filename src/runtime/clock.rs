//! Timestamps for replayed streams.

use chrono::{DateTime, Duration, Utc};

/// Derives a timestamp from the number of samples seen at the nominal rate,
/// so replays faster than real time still drive the 5 s timers correctly.
#[derive(Debug, Clone)]
pub struct SampleClock {
    origin: DateTime<Utc>,
    sample_rate: f64,
    samples: u64,
}

impl SampleClock {
    pub fn new(origin: DateTime<Utc>, sample_rate: f64) -> Self {
        Self {
            origin,
            sample_rate,
            samples: 0,
        }
    }

    /// Advance by one sample and return the new time.
    pub fn tick(&mut self) -> DateTime<Utc> {
        self.samples += 1;
        self.now()
    }

    pub fn now(&self) -> DateTime<Utc> {
        let micros = self.samples as f64 * 1_000_000.0 / self.sample_rate;
        self.origin + Duration::microseconds(micros.round() as i64)
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances_at_sample_rate() {
        let origin = Utc::now();
        let mut clock = SampleClock::new(origin, 500.0);
        for _ in 0..2500 {
            clock.tick();
        }
        assert_eq!(clock.now() - origin, Duration::seconds(5));
        assert_eq!(clock.samples(), 2500);
    }
}
