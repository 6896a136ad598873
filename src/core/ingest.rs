//! Stream ingestion and sample-loss detection.
//!
//! The device numbers every sample with a counter that may wrap. A counter
//! that does not follow its predecessor means samples were lost in transport.
//! Loss is informational only: the pipeline keeps buffering whatever arrives.

use crate::collector::types::Sample;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A detected discontinuity in the sample counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LossEvent {
    /// Counter of the last sample before the gap
    pub previous: u64,
    /// Counter of the sample that revealed the gap
    pub counter: u64,
    /// Number of missing samples, `None` when it cannot be determined
    pub missing: Option<u64>,
}

/// Tracks the previous counter value of one connection.
#[derive(Debug, Clone)]
pub struct LossDetector {
    modulus: Option<u64>,
    previous: Option<u64>,
}

impl LossDetector {
    /// Create a detector. `modulus` is the counter wraparound, if any.
    pub fn new(modulus: Option<u64>) -> Self {
        Self {
            modulus,
            previous: None,
        }
    }

    /// Check a sample against the previous counter and update the baseline.
    ///
    /// The first sample after creation or [`reset`](Self::reset) never
    /// reports a loss.
    pub fn ingest(&mut self, sample: &Sample) -> Option<LossEvent> {
        let counter = sample.counter;
        let previous = self.previous.replace(counter)?;

        let missing = match self.modulus {
            Some(m) => {
                if counter >= m || previous >= m || counter == previous {
                    None
                } else {
                    // Distance forward from `previous` to `counter` on the
                    // ring, minus the step itself. Both are below `m`.
                    let gap = if counter > previous {
                        counter - previous - 1
                    } else {
                        m - (previous - counter) - 1
                    };
                    if gap == 0 {
                        return None;
                    }
                    Some(gap)
                }
            }
            None => {
                if counter == previous.wrapping_add(1) {
                    return None;
                }
                if counter > previous {
                    Some(counter - previous - 1)
                } else {
                    None
                }
            }
        };

        let event = LossEvent {
            previous,
            counter,
            missing,
        };
        match missing {
            Some(n) => warn!(previous, counter, missing = n, "sample loss detected"),
            None => warn!(previous, counter, "sample counter discontinuity of unknown size"),
        }
        Some(event)
    }

    /// Forget the baseline, e.g. on reconnect.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// Counter of the last ingested sample.
    pub fn previous(&self) -> Option<u64> {
        self.previous
    }
}
