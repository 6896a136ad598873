//! Replay of recorded sample streams.
//!
//! One sample per line as `counter,eeg0,eeg1,ecg`. Blank lines and lines
//! starting with `#` are skipped; malformed lines are reported and skipped.

use crate::collector::types::Sample;
use crate::error::PipelineError;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::warn;

/// Iterator over the samples of a recording.
pub struct ReplaySource<R> {
    lines: std::io::Lines<R>,
    line_no: usize,
    skipped: usize,
}

impl ReplaySource<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> ReplaySource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            skipped: 0,
        }
    }

    /// Malformed lines skipped so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<R: BufRead> Iterator for ReplaySource<R> {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    warn!(line = self.line_no + 1, error = %e, "replay read failed");
                    return None;
                }
            };
            self.line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            match Sample::parse_line(trimmed) {
                Ok(sample) => return Some(sample),
                Err(e) => {
                    self.skipped += 1;
                    warn!(line = self.line_no, error = %e, "skipping malformed sample");
                }
            }
        }
    }
}
