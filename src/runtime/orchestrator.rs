//! Single-threaded owner of the pipeline state.
//!
//! The orchestrator holds the loss detector, the rolling windows, the BPM
//! display filter, the debouncer and the session aggregator. It talks to the
//! spectral, cardiac and classifier workers only through their queues and
//! never blocks on them: requests are submitted without waiting and results
//! are picked up by [`Orchestrator::poll`].

use crate::collector::Sample;
use crate::config::Config;
use crate::core::cardiac::{
    BpmDisplayFilter, CardiacExtractor, CardiacRequest, CardiacResponse, EcgWindow,
};
use crate::core::ingest::LossDetector;
use crate::core::session::{SessionAggregator, SessionGoal, SessionLength, SessionSummary};
use crate::core::spectral::{
    BandPowerEngine, BandPowerFrame, EegWindow, Goal, SpectralRequest, SpectralResponse,
};
use crate::core::state::{Debouncer, HrvRuleClassifier, State, StateClassifier, StateEvent};
use crate::error::PipelineError;
use crate::runtime::worker::Worker;
use crate::telemetry::SharedPipelineLog;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Builds a fresh classifier for every connection.
pub type ClassifierFactory = Box<dyn Fn() -> Box<dyn StateClassifier> + Send>;

/// Everything the pipeline reports to its consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    SampleLoss {
        timestamp: DateTime<Utc>,
        previous: u64,
        counter: u64,
        /// `None` when the gap size cannot be determined
        missing: Option<u64>,
    },
    BandPower {
        timestamp: DateTime<Utc>,
        left: BandPowerFrame,
        right: BandPowerFrame,
        goal: Goal,
        goal_score: f64,
    },
    Cardiac {
        timestamp: DateTime<Utc>,
        displayed_bpm: Option<f64>,
        stats: CardiacResponse,
    },
    RawState {
        timestamp: DateTime<Utc>,
        state: State,
    },
    DisplayState {
        timestamp: DateTime<Utc>,
        state: State,
    },
    SessionStarted {
        timestamp: DateTime<Utc>,
        minutes: u64,
        goal: SessionGoal,
    },
    SessionSummary {
        summary: Box<SessionSummary>,
    },
    SessionEmpty {
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::SampleLoss { .. } => "sample_loss",
            PipelineEvent::BandPower { .. } => "band_power",
            PipelineEvent::Cardiac { .. } => "cardiac",
            PipelineEvent::RawState { .. } => "raw_state",
            PipelineEvent::DisplayState { .. } => "display_state",
            PipelineEvent::SessionStarted { .. } => "session_started",
            PipelineEvent::SessionSummary { .. } => "session_summary",
            PipelineEvent::SessionEmpty { .. } => "session_empty",
        }
    }
}

/// HRV triple sent to the classifier worker.
#[derive(Debug, Clone, Copy)]
struct ClassifyRequest {
    sdnn: f64,
    rmssd: f64,
    pnn50: f64,
    timestamp: DateTime<Utc>,
}

/// Worker handles of one connection, with in-flight request counts.
struct Workers {
    spectral: Worker<SpectralRequest, Option<SpectralResponse>>,
    cardiac: Worker<CardiacRequest, CardiacResponse>,
    classifier: Worker<ClassifyRequest, StateEvent>,
    spectral_pending: usize,
    cardiac_pending: usize,
    classifier_pending: usize,
}

impl Workers {
    fn spawn(
        config: &Config,
        classifier: Box<dyn StateClassifier>,
        log: &SharedPipelineLog,
    ) -> Result<Self, PipelineError> {
        let capacity = config.worker_queue;
        let sample_rate = config.stream.sample_rate;

        let mut engine = BandPowerEngine::new(
            config.spectral.fft_size,
            sample_rate,
            config.spectral.bands,
            config.spectral.smoothing,
        );
        let spectral = Worker::spawn("spectral", capacity, move |req: SpectralRequest| {
            Some(engine.process(&req))
        })?
        .with_log(log.clone());

        let mut extractor = CardiacExtractor::new(sample_rate, &config.cardiac);
        let cardiac = Worker::spawn("cardiac", capacity, move |req: CardiacRequest| {
            Some(extractor.process(&req))
        })?
        .with_log(log.clone());

        let classifier = Worker::spawn("classifier", capacity, move |req: ClassifyRequest| {
            Some(StateEvent {
                raw_state: classifier.classify(req.sdnn, req.rmssd, req.pnn50),
                timestamp: req.timestamp,
            })
        })?
        .with_log(log.clone());

        Ok(Self {
            spectral,
            cardiac,
            classifier,
            spectral_pending: 0,
            cardiac_pending: 0,
            classifier_pending: 0,
        })
    }

    /// In-flight requests of the workers still running.
    fn pending(&self) -> usize {
        [
            (self.spectral.is_alive(), self.spectral_pending),
            (self.cardiac.is_alive(), self.cardiac_pending),
            (self.classifier.is_alive(), self.classifier_pending),
        ]
        .iter()
        .filter(|(alive, _)| *alive)
        .map(|(_, pending)| pending)
        .sum()
    }

    fn shutdown(&mut self) {
        self.spectral.shutdown();
        self.cardiac.shutdown();
        self.classifier.shutdown();
    }
}

/// Drives the pipeline for one device.
pub struct Orchestrator {
    config: Config,
    log: SharedPipelineLog,
    classifier_factory: ClassifierFactory,
    goal: Goal,
    loss: LossDetector,
    eeg: EegWindow,
    ecg: EcgWindow,
    bpm_filter: BpmDisplayFilter,
    debouncer: Debouncer,
    session: SessionAggregator,
    workers: Option<Workers>,
    latest: Option<SpectralResponse>,
    events: Vec<PipelineEvent>,
}

impl Orchestrator {
    /// Create a disconnected orchestrator using the rule-based classifier.
    pub fn new(config: Config, log: SharedPipelineLog) -> Self {
        let debounce = debounce_interval(&config);
        Self {
            loss: LossDetector::new(config.stream.counter_modulus),
            eeg: EegWindow::new(
                config.spectral.fft_size,
                config.spectral.hop,
                config.stream.sample_rate,
            ),
            ecg: EcgWindow::new(
                config.cardiac.capacity,
                config.cardiac.batch,
                config.stream.sample_rate,
            ),
            bpm_filter: BpmDisplayFilter::new(
                config.cardiac.bpm_window,
                config.cardiac.bpm_max_step,
            ),
            debouncer: Debouncer::new(debounce, Utc::now()),
            session: SessionAggregator::new(config.session.symmetry_threshold),
            goal: config.goal,
            classifier_factory: Box::new(default_classifier),
            workers: None,
            latest: None,
            events: Vec::new(),
            config,
            log,
        }
    }

    /// Use another classifier. Takes effect on the next connect.
    pub fn with_classifier<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn StateClassifier> + Send + 'static,
    {
        self.classifier_factory = Box::new(factory);
        self
    }

    /// Start a fresh connection: new workers, empty windows, debouncer in
    /// its grace period.
    pub fn connect(&mut self, now: DateTime<Utc>) -> Result<(), PipelineError> {
        if self.workers.is_some() {
            self.disconnect(now)?;
        }
        self.reset_windows(now);
        let workers = Workers::spawn(&self.config, (self.classifier_factory)(), &self.log)?;
        self.workers = Some(workers);
        info!("device connected");
        Ok(())
    }

    /// Tear the connection down. An active session is stopped and
    /// summarized if `session.stop_on_disconnect` is set, otherwise it keeps
    /// its record until stopped.
    pub fn disconnect(&mut self, now: DateTime<Utc>) -> Result<(), PipelineError> {
        if self.workers.is_none() {
            return Ok(());
        }
        // Collect what the workers already finished before dropping them.
        self.poll(now)?;
        if self.session.is_active() && self.config.session.stop_on_disconnect {
            self.stop_session(now)?;
        }

        if let Some(mut workers) = self.workers.take() {
            workers.shutdown();
        }
        self.reset_windows(now);
        info!("device disconnected");
        Ok(())
    }

    fn reset_windows(&mut self, now: DateTime<Utc>) {
        self.loss.reset();
        self.eeg.reset();
        self.ecg.reset();
        self.bpm_filter.reset();
        self.debouncer.reset(now);
        self.latest = None;
    }

    pub fn is_connected(&self) -> bool {
        self.workers.is_some()
    }

    /// Ingest one device sample and react to any finished worker results.
    pub fn handle_sample(&mut self, sample: Sample, now: DateTime<Utc>) -> Result<(), PipelineError> {
        let Some(workers) = self.workers.as_mut() else {
            return Err(PipelineError::NotConnected);
        };

        self.log.record_sample();
        if let Some(loss) = self.loss.ingest(&sample) {
            self.log.record_loss(loss.missing);
            self.events.push(PipelineEvent::SampleLoss {
                timestamp: now,
                previous: loss.previous,
                counter: loss.counter,
                missing: loss.missing,
            });
        }

        if let Some(request) = self.eeg.push(sample.eeg0, sample.eeg1) {
            dispatch(&workers.spectral, &mut workers.spectral_pending, request);
        }
        if let Some(request) = self.ecg.push(sample.ecg) {
            dispatch(&workers.cardiac, &mut workers.cardiac_pending, request);
        }

        self.poll(now)
    }

    /// Pick up every finished worker result without blocking.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Result<(), PipelineError> {
        let Some(workers) = self.workers.as_mut() else {
            return Ok(());
        };

        while let Some(response) = workers.spectral.try_recv() {
            workers.spectral_pending = workers.spectral_pending.saturating_sub(1);
            let Some(response) = response else {
                debug!("spectral window skipped");
                continue;
            };
            self.log.record_spectral_frame();
            self.latest = Some(response);
            self.session
                .record(now, &response.smooth0, &response.smooth1);
            self.events.push(PipelineEvent::BandPower {
                timestamp: now,
                left: response.smooth0,
                right: response.smooth1,
                goal: self.goal,
                goal_score: self.goal.score(&response.smooth0, &response.smooth1),
            });
        }

        while let Some(response) = workers.cardiac.try_recv() {
            workers.cardiac_pending = workers.cardiac_pending.saturating_sub(1);
            self.log.record_cardiac_batch();
            let displayed_bpm = self.bpm_filter.update(response.bpm);
            let request = ClassifyRequest {
                sdnn: response.sdnn,
                rmssd: response.rmssd,
                pnn50: response.pnn50,
                timestamp: now,
            };
            self.events.push(PipelineEvent::Cardiac {
                timestamp: now,
                displayed_bpm,
                stats: response,
            });
            dispatch(&workers.classifier, &mut workers.classifier_pending, request);
        }

        let mut changed = None;
        while let Some(event) = workers.classifier.try_recv() {
            workers.classifier_pending = workers.classifier_pending.saturating_sub(1);
            self.log.record_raw_state();
            self.events.push(PipelineEvent::RawState {
                timestamp: event.timestamp,
                state: event.raw_state,
            });
            if let Some(state) = self.debouncer.observe(event, now) {
                changed = Some(state);
            }
        }
        if let Some(state) = changed {
            self.display_changed(state, now);
        }

        self.expire_session(now)
    }

    /// Timer-driven re-evaluation: debounce tick and session countdown.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<(), PipelineError> {
        if self.workers.is_some() {
            if let Some(state) = self.debouncer.tick(now) {
                self.display_changed(state, now);
            }
        }
        self.expire_session(now)
    }

    /// Poll until no request is in flight or `timeout` passes.
    pub fn settle(
        &mut self,
        now: DateTime<Utc>,
        timeout: std::time::Duration,
    ) -> Result<(), PipelineError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.poll(now)?;
            let pending = self.workers.as_ref().map_or(0, Workers::pending);
            if pending == 0 || Instant::now() >= deadline {
                return Ok(());
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }

    fn display_changed(&mut self, state: State, now: DateTime<Utc>) {
        self.log.record_display_change();
        debug!(%state, "display state changed");
        self.events.push(PipelineEvent::DisplayState {
            timestamp: now,
            state,
        });
    }

    fn expire_session(&mut self, now: DateTime<Utc>) -> Result<(), PipelineError> {
        if self.session.is_expired(now) {
            info!("session timer elapsed");
            self.stop_session(now)?;
        }
        Ok(())
    }

    pub fn start_session(
        &mut self,
        now: DateTime<Utc>,
        length: SessionLength,
        goal: SessionGoal,
    ) -> Result<(), PipelineError> {
        self.session.start(now, length, goal)?;
        self.events.push(PipelineEvent::SessionStarted {
            timestamp: now,
            minutes: length.minutes(),
            goal,
        });
        Ok(())
    }

    /// Stop the active session. `Ok(None)` means it recorded nothing.
    pub fn stop_session(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionSummary>, PipelineError> {
        let summary = self.session.stop(now)?;
        match &summary {
            Some(summary) => {
                self.log.record_session_completed();
                self.events.push(PipelineEvent::SessionSummary {
                    summary: Box::new(summary.clone()),
                });
            }
            None => self
                .events
                .push(PipelineEvent::SessionEmpty { timestamp: now }),
        }
        Ok(summary)
    }

    pub fn session_active(&self) -> bool {
        self.session.is_active()
    }

    pub fn last_summary(&self) -> Option<&SessionSummary> {
        self.session.last_summary()
    }

    /// Change the online goal; applies from the next frame.
    pub fn set_goal(&mut self, goal: Goal) {
        self.goal = goal;
    }

    pub fn goal(&self) -> Goal {
        self.goal
    }

    /// Online score of the latest frame pair.
    pub fn goal_score(&self) -> Option<f64> {
        self.latest
            .map(|frames| self.goal.score(&frames.smooth0, &frames.smooth1))
    }

    pub fn display_state(&self) -> State {
        self.debouncer.display()
    }

    pub fn displayed_bpm(&self) -> Option<f64> {
        self.bpm_filter.displayed()
    }

    pub fn log(&self) -> &SharedPipelineLog {
        &self.log
    }

    /// Drain the events produced since the last call.
    pub fn take_events(&mut self) -> Vec<PipelineEvent> {
        std::mem::take(&mut self.events)
    }

    /// Stop all workers without touching the session.
    pub fn shutdown(&mut self) {
        if let Some(mut workers) = self.workers.take() {
            workers.shutdown();
            info!("pipeline shut down");
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Queue `request` on `worker`. A worker that has died only costs this
/// cycle's result; the pipeline keeps running without it.
fn dispatch<Req, Resp>(worker: &Worker<Req, Resp>, pending: &mut usize, request: Req)
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    match worker.submit(request) {
        Ok(true) => *pending += 1,
        Ok(false) => {}
        Err(e) => {
            *pending = 0;
            warn!(worker = worker.name(), error = %e, "worker unavailable, result skipped");
        }
    }
}

fn default_classifier() -> Box<dyn StateClassifier> {
    Box::new(HrvRuleClassifier::default())
}

fn debounce_interval(config: &Config) -> Duration {
    Duration::from_std(config.state.interval).unwrap_or_else(|_| Duration::seconds(5))
}
