//! Message-driven analysis workers.
//!
//! Each worker owns its state on a dedicated thread and handles one request
//! at a time, so its responses come back in request order.

use crate::error::PipelineError;
use crate::telemetry::SharedPipelineLog;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

/// A named worker thread behind bounded request/response queues.
pub struct Worker<Req, Resp> {
    name: String,
    requests: Option<Sender<Req>>,
    responses: Receiver<Resp>,
    handle: Option<JoinHandle<()>>,
    log: Option<SharedPipelineLog>,
}

impl<Req, Resp> Worker<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// Spawn a worker running `handler` for every request.
    ///
    /// A handler returning `None` produces no response for that request.
    pub fn spawn<F>(name: &str, capacity: usize, mut handler: F) -> Result<Self, PipelineError>
    where
        F: FnMut(Req) -> Option<Resp> + Send + 'static,
    {
        let capacity = capacity.max(1);
        let (req_tx, req_rx) = bounded::<Req>(capacity);
        let (resp_tx, resp_rx) = bounded::<Resp>(capacity);

        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(format!("worker-{name}"))
            .spawn(move || {
                debug!(worker = thread_name.as_str(), "worker started");
                for request in req_rx.iter() {
                    if let Some(response) = handler(request) {
                        if resp_tx.send(response).is_err() {
                            break;
                        }
                    }
                }
                debug!(worker = thread_name.as_str(), "worker stopped");
            })
            .map_err(|e| PipelineError::WorkerSpawn(name.to_string(), e))?;

        info!(worker = name, capacity, "spawned worker");
        Ok(Self {
            name: name.to_string(),
            requests: Some(req_tx),
            responses: resp_rx,
            handle: Some(handle),
            log: None,
        })
    }

    /// Count dropped requests in `log`.
    pub fn with_log(mut self, log: SharedPipelineLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the thread is still running. A handler that panicked ends it.
    pub fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Queue a request without blocking.
    ///
    /// Returns `Ok(false)` when the queue is full and the request was dropped.
    pub fn submit(&self, request: Req) -> Result<bool, PipelineError> {
        let sender = self
            .requests
            .as_ref()
            .ok_or_else(|| PipelineError::WorkerDisconnected(self.name.clone()))?;

        match sender.try_send(request) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => {
                debug!(worker = self.name.as_str(), "queue full, dropping request");
                if let Some(log) = &self.log {
                    log.record_dropped_request();
                }
                Ok(false)
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(PipelineError::WorkerDisconnected(self.name.clone()))
            }
        }
    }

    pub fn try_recv(&self) -> Option<Resp> {
        self.responses.try_recv().ok()
    }

    /// Wait up to `timeout` for the next response.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Resp>, PipelineError> {
        match self.responses.recv_timeout(timeout) {
            Ok(response) => Ok(Some(response)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(PipelineError::WorkerDisconnected(self.name.clone()))
            }
        }
    }

    /// Close the request queue and join the thread. Pending requests are
    /// still processed; their responses are discarded.
    pub fn shutdown(&mut self) {
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            // Keep the worker from blocking on a full response queue.
            while !handle.is_finished() {
                while self.responses.try_recv().is_ok() {}
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
            debug!(worker = self.name.as_str(), "worker joined");
        }
    }
}

impl<Req, Resp> Drop for Worker<Req, Resp> {
    fn drop(&mut self) {
        // Closing the queue ends the thread; dropping the response receiver
        // releases it if it is blocked on a send.
        self.requests.take();
    }
}
