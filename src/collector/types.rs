//! Sample types delivered by the device transport.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};

/// One device tick: a counter plus two EEG channels and one ECG channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Device sample counter (may wrap)
    pub counter: u64,
    /// Left hemisphere EEG
    pub eeg0: f64,
    /// Right hemisphere EEG
    pub eeg1: f64,
    /// ECG lead
    pub ecg: f64,
}

impl Sample {
    pub fn new(counter: u64, eeg0: f64, eeg1: f64, ecg: f64) -> Self {
        Self {
            counter,
            eeg0,
            eeg1,
            ecg,
        }
    }

    /// Parse a `counter,eeg0,eeg1,ecg` line.
    ///
    /// Whitespace around fields is ignored; semicolons and tabs are accepted
    /// as separators too.
    pub fn parse_line(line: &str) -> Result<Self, PipelineError> {
        let fields: Vec<&str> = line
            .split(|c| c == ',' || c == ';' || c == '\t')
            .map(str::trim)
            .collect();

        if fields.len() != 4 {
            return Err(PipelineError::InvalidSample(format!(
                "expected 4 fields, found {}: {line:?}",
                fields.len()
            )));
        }

        let counter = fields[0]
            .parse::<u64>()
            .map_err(|e| PipelineError::InvalidSample(format!("counter {:?}: {e}", fields[0])))?;

        let mut values = [0.0f64; 3];
        for (slot, raw) in values.iter_mut().zip(&fields[1..]) {
            *slot = raw
                .parse::<f64>()
                .map_err(|e| PipelineError::InvalidSample(format!("value {raw:?}: {e}")))?;
        }

        Ok(Self::new(counter, values[0], values[1], values[2]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        let sample = Sample::parse_line("12, 0.5,-1.25 ,3").unwrap();
        assert_eq!(sample, Sample::new(12, 0.5, -1.25, 3.0));

        let sample = Sample::parse_line("7\t1\t2\t3").unwrap();
        assert_eq!(sample.counter, 7);
    }

    #[test]
    fn test_parse_line_rejects_malformed() {
        assert!(Sample::parse_line("1,2,3").is_err());
        assert!(Sample::parse_line("-1,2,3,4").is_err());
        assert!(Sample::parse_line("1,a,3,4").is_err());
    }
}
