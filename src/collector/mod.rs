//! Sample collection.
//!
//! Stands in for the device transport: a [`Collector`] drains any sample
//! source on its own thread and hands samples to the orchestrator over a
//! bounded channel.

pub mod replay;
pub mod synthetic;
pub mod types;

pub use replay::ReplaySource;
pub use synthetic::{SyntheticConfig, SyntheticSource};
pub use types::Sample;

use crate::error::PipelineError;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Channel capacity between the collector thread and its consumer.
pub const CHANNEL_CAPACITY: usize = 10_000;

/// How the collector paces delivery.
#[derive(Debug, Clone, Default)]
pub struct CollectorConfig {
    /// Deliver at this rate (Hz); `None` delivers as fast as the consumer reads
    pub realtime_rate: Option<f64>,
}

/// Runs a sample source on a background thread.
pub struct Collector {
    config: CollectorConfig,
    sender: Option<Sender<Sample>>,
    receiver: Receiver<Sample>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Collector {
    pub fn new(config: CollectorConfig) -> Self {
        let (sender, receiver) = bounded(CHANNEL_CAPACITY);
        Self {
            config,
            sender: Some(sender),
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Start draining `source`.
    ///
    /// The channel disconnects once the source is exhausted or the collector
    /// is stopped. A collector runs one source in its lifetime.
    pub fn start<I>(&mut self, source: I) -> Result<(), PipelineError>
    where
        I: Iterator<Item = Sample> + Send + 'static,
    {
        if self.running.load(Ordering::SeqCst) {
            return Err(PipelineError::CollectorRunning);
        }
        let sender = self.sender.take().ok_or(PipelineError::CollectorRunning)?;

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let interval = self
            .config
            .realtime_rate
            .filter(|rate| *rate > 0.0)
            .map(|rate| Duration::from_secs_f64(1.0 / rate));

        let handle = thread::Builder::new()
            .name("collector".to_string())
            .spawn(move || run_source(source, sender, running, interval))
            .map_err(|e| PipelineError::WorkerSpawn("collector".to_string(), e))?;
        self.handle = Some(handle);

        info!(realtime = interval.is_some(), "collector started");
        Ok(())
    }

    /// Stop delivering samples and wait for the thread.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            // Unblock a sender stuck on a full channel.
            while self.receiver.try_recv().is_ok() {}
            let _ = handle.join();
            debug!("collector stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn receiver(&self) -> &Receiver<Sample> {
        &self.receiver
    }

    /// Try to receive a sample without blocking.
    pub fn try_recv(&self) -> Option<Sample> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_source<I>(
    source: I,
    sender: Sender<Sample>,
    running: Arc<AtomicBool>,
    interval: Option<Duration>,
) where
    I: Iterator<Item = Sample>,
{
    let started = Instant::now();
    let mut delivered: u32 = 0;

    for sample in source {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        if let Some(interval) = interval {
            let due = started + interval * delivered;
            let now = Instant::now();
            if due > now {
                thread::sleep(due - now);
            }
        }
        // Block under backpressure; a stop drains the channel to release us.
        if sender.send(sample).is_err() {
            break;
        }
        delivered = delivered.saturating_add(1);
    }

    running.store(false, Ordering::SeqCst);
    debug!(delivered, "collector source finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_delivers_all_samples() {
        let mut collector = Collector::new(CollectorConfig::default());
        let source = SyntheticSource::new(SyntheticConfig {
            total_samples: Some(1000),
            ..Default::default()
        });
        collector.start(source).unwrap();

        let samples: Vec<Sample> = collector.receiver().iter().collect();
        assert_eq!(samples.len(), 1000);
        assert_eq!(samples[999].counter, 999 % 256);
        assert!(!collector.is_running());
    }

    #[test]
    fn test_collector_start_twice() {
        let mut collector = Collector::new(CollectorConfig::default());
        collector.start(std::iter::empty()).unwrap();
        collector.stop();
        assert!(matches!(
            collector.start(std::iter::empty()),
            Err(PipelineError::CollectorRunning)
        ));
    }

    #[test]
    fn test_collector_stop_unblocks_endless_source() {
        let mut collector = Collector::new(CollectorConfig::default());
        collector
            .start(SyntheticSource::new(SyntheticConfig::default()))
            .unwrap();
        assert!(collector.receiver().recv().is_ok());
        collector.stop();
        assert!(!collector.is_running());
    }
}
