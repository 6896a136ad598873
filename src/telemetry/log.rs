//! Pipeline counters.
//!
//! Counts what the pipeline did (samples, frames, batches, states) without
//! retaining any signal content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Atomic counters shared between the orchestrator and its workers.
#[derive(Debug)]
pub struct PipelineLog {
    samples_ingested: AtomicU64,
    /// Missing samples summed over all loss events with a known count
    samples_lost: AtomicU64,
    loss_events: AtomicU64,
    spectral_frames: AtomicU64,
    cardiac_batches: AtomicU64,
    raw_states: AtomicU64,
    display_changes: AtomicU64,
    sessions_completed: AtomicU64,
    /// Requests dropped because a worker queue was full
    dropped_requests: AtomicU64,
    started_at: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl PipelineLog {
    pub fn new() -> Self {
        Self {
            samples_ingested: AtomicU64::new(0),
            samples_lost: AtomicU64::new(0),
            loss_events: AtomicU64::new(0),
            spectral_frames: AtomicU64::new(0),
            cardiac_batches: AtomicU64::new(0),
            raw_states: AtomicU64::new(0),
            display_changes: AtomicU64::new(0),
            sessions_completed: AtomicU64::new(0),
            dropped_requests: AtomicU64::new(0),
            started_at: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that restores and saves its totals at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            debug!(error = %e, "could not load previous pipeline stats");
        }

        log
    }

    pub fn record_sample(&self) {
        self.samples_ingested.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a loss event; `missing` is `None` when the gap is unknown.
    pub fn record_loss(&self, missing: Option<u64>) {
        self.loss_events.fetch_add(1, Ordering::Relaxed);
        if let Some(n) = missing {
            self.samples_lost.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn record_spectral_frame(&self) {
        self.spectral_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cardiac_batch(&self) {
        self.cardiac_batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_raw_state(&self) {
        self.raw_states.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_display_change(&self) {
        self.display_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_completed(&self) {
        self.sessions_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_request(&self) {
        self.dropped_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            samples_ingested: self.samples_ingested.load(Ordering::Relaxed),
            samples_lost: self.samples_lost.load(Ordering::Relaxed),
            loss_events: self.loss_events.load(Ordering::Relaxed),
            spectral_frames: self.spectral_frames.load(Ordering::Relaxed),
            cardiac_batches: self.cardiac_batches.load(Ordering::Relaxed),
            raw_states: self.raw_states.load(Ordering::Relaxed),
            display_changes: self.display_changes.load(Ordering::Relaxed),
            sessions_completed: self.sessions_completed.load(Ordering::Relaxed),
            dropped_requests: self.dropped_requests.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Human-readable summary for the terminal.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Pipeline Statistics:\n\
             - Samples ingested: {}\n\
             - Samples lost: {} ({} loss events)\n\
             - Spectral frames: {}\n\
             - Cardiac batches: {}\n\
             - Raw states classified: {}\n\
             - Display state changes: {}\n\
             - Sessions completed: {}\n\
             - Dropped worker requests: {}\n\
             - Uptime: {} seconds",
            stats.samples_ingested,
            stats.samples_lost,
            stats.loss_events,
            stats.spectral_frames,
            stats.cardiac_batches,
            stats.raw_states,
            stats.display_changes,
            stats.sessions_completed,
            stats.dropped_requests,
            stats.uptime_secs
        )
    }

    /// Save totals to disk. A log without a path is a no-op.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                samples_ingested: stats.samples_ingested,
                samples_lost: stats.samples_lost,
                loss_events: stats.loss_events,
                spectral_frames: stats.spectral_frames,
                cardiac_batches: stats.cardiac_batches,
                sessions_completed: stats.sessions_completed,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.samples_ingested
                    .store(persisted.samples_ingested, Ordering::Relaxed);
                self.samples_lost
                    .store(persisted.samples_lost, Ordering::Relaxed);
                self.loss_events
                    .store(persisted.loss_events, Ordering::Relaxed);
                self.spectral_frames
                    .store(persisted.spectral_frames, Ordering::Relaxed);
                self.cardiac_batches
                    .store(persisted.cardiac_batches, Ordering::Relaxed);
                self.sessions_completed
                    .store(persisted.sessions_completed, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    pub fn reset(&self) {
        for counter in [
            &self.samples_ingested,
            &self.samples_lost,
            &self.loss_events,
            &self.spectral_frames,
            &self.cardiac_batches,
            &self.raw_states,
            &self.display_changes,
            &self.sessions_completed,
            &self.dropped_requests,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for PipelineLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the pipeline counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub samples_ingested: u64,
    pub samples_lost: u64,
    pub loss_events: u64,
    pub spectral_frames: u64,
    pub cardiac_batches: u64,
    pub raw_states: u64,
    pub display_changes: u64,
    pub sessions_completed: u64,
    pub dropped_requests: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Totals kept across runs.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    samples_ingested: u64,
    samples_lost: u64,
    loss_events: u64,
    spectral_frames: u64,
    cardiac_batches: u64,
    sessions_completed: u64,
    last_updated: DateTime<Utc>,
}

pub type SharedPipelineLog = Arc<PipelineLog>;

pub fn create_shared_log() -> SharedPipelineLog {
    Arc::new(PipelineLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedPipelineLog {
    Arc::new(PipelineLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loss_counting() {
        let log = PipelineLog::new();
        log.record_loss(Some(3));
        log.record_loss(None);
        log.record_sample();

        let stats = log.stats();
        assert_eq!(stats.loss_events, 2);
        assert_eq!(stats.samples_lost, 3);
        assert_eq!(stats.samples_ingested, 1);
    }

    #[test]
    fn test_reset() {
        let log = PipelineLog::new();
        log.record_spectral_frame();
        log.record_dropped_request();
        log.reset();

        let stats = log.stats();
        assert_eq!(stats.spectral_frames, 0);
        assert_eq!(stats.dropped_requests, 0);
    }

    #[test]
    fn test_summary_format() {
        let summary = PipelineLog::new().summary();
        assert!(summary.contains("Samples ingested"));
        assert!(summary.contains("Dropped worker requests"));
    }

    #[test]
    fn test_persistence_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "biostream-stats-{}.json",
            uuid::Uuid::new_v4()
        ));

        let log = PipelineLog::with_persistence(path.clone());
        log.record_cardiac_batch();
        log.record_cardiac_batch();
        log.record_session_completed();
        log.save().unwrap();

        let restored = PipelineLog::with_persistence(path.clone());
        let stats = restored.stats();
        assert_eq!(stats.cardiac_batches, 2);
        assert_eq!(stats.sessions_completed, 1);
        assert_eq!(stats.raw_states, 0);

        let _ = std::fs::remove_file(path);
    }
}
