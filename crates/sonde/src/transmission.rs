//! Asynchronous delivery engine.
//!
//! A [`Transmission`] owns a bounded queue of pending events, a fixed pool of
//! delivery workers and a bounded queue of responses. Callers hand events to
//! [`Transmission::send`]; workers post them and report one [`Response`] per
//! accepted event. [`Transmission::shutdown`] stops intake, lets the workers
//! drain what is queued, then closes the response queue.

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{error, info, warn};

use crate::{
    error::{Error, Result},
    event::Event,
    response::{Response, ResponseQueue, ResponseSink},
    transport::{HttpTransport, Transport, USER_AGENT},
    worker::{DeliveryWorker, PendingEvent},
};

/// Configuration for the delivery engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmissionConfig {
    /// Number of delivery workers.
    pub max_concurrent_batches: usize,
    /// Wait for pending queue capacity instead of dropping on overflow.
    pub block_on_send: bool,
    /// Wait for response queue capacity instead of discarding responses.
    pub block_on_response: bool,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Capacity of the pending event queue.
    pub max_pending_events: usize,
    /// Capacity of the response queue.
    pub max_pending_responses: usize,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for TransmissionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_batches: crate::DEFAULT_MAX_CONCURRENT_BATCHES,
            block_on_send: false,
            block_on_response: false,
            timeout: Duration::from_millis(crate::DEFAULT_TIMEOUT_MS),
            max_pending_events: crate::DEFAULT_MAX_PENDING_EVENTS,
            max_pending_responses: crate::DEFAULT_MAX_PENDING_RESPONSES,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

impl TransmissionConfig {
    /// Checks that the pool and both queues can hold at least one item.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` naming the first rejected setting.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_batches == 0 {
            return Err(Error::invalid_argument("max_concurrent_batches", "must be greater than 0"));
        }
        if self.max_pending_events == 0 {
            return Err(Error::invalid_argument("max_pending_events", "must be greater than 0"));
        }
        if self.max_pending_responses == 0 {
            return Err(Error::invalid_argument("max_pending_responses", "must be greater than 0"));
        }
        if self.timeout.is_zero() {
            return Err(Error::invalid_argument("timeout", "must be greater than 0"));
        }
        Ok(())
    }
}

/// Lifecycle of a [`Transmission`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionState {
    /// Queues allocated, workers not yet spawned.
    Created,
    /// Accepting events.
    Running,
    /// Shutdown started; queued events are draining.
    Disposing,
    /// All workers exited and the response queue is closed.
    Disposed,
}

/// Bounded-queue, fixed-pool delivery engine.
pub struct Transmission {
    config: TransmissionConfig,
    state: Mutex<TransmissionState>,
    pending: Sender<PendingEvent>,
    // Keeps the queue open after every worker is lost; drained on shutdown.
    backlog: Receiver<PendingEvent>,
    responses: ResponseSink,
    response_queue: ResponseQueue,
    live_workers: Arc<AtomicUsize>,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
}

impl Transmission {
    /// Creates a transmission posting over HTTP and spawns its workers.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for unusable settings and
    /// `Error::Configuration` when called outside a tokio runtime or when the
    /// HTTP client cannot be built.
    pub fn new(config: TransmissionConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(config.timeout, &config.user_agent)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Creates a transmission posting through `transport` and spawns its
    /// workers.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for unusable settings and
    /// `Error::Configuration` when called outside a tokio runtime.
    pub fn with_transport(config: TransmissionConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|e| Error::configuration(format!("transmission requires a tokio runtime: {e}")))?;

        let (pending, backlog) = async_channel::bounded(config.max_pending_events);
        let (response_tx, response_rx) = async_channel::bounded(config.max_pending_responses);
        let responses = ResponseSink::new(response_tx, config.block_on_response);

        let transmission = Self {
            state: Mutex::new(TransmissionState::Created),
            pending,
            backlog,
            responses,
            response_queue: ResponseQueue::new(response_rx),
            live_workers: Arc::new(AtomicUsize::new(config.max_concurrent_batches)),
            worker_handles: Mutex::new(Vec::with_capacity(config.max_concurrent_batches)),
            transport: Mutex::new(Some(Arc::clone(&transport))),
            config,
        };

        {
            let mut handles = transmission.worker_handles.lock();
            for worker_id in 0..transmission.config.max_concurrent_batches {
                let worker = DeliveryWorker::new(
                    worker_id,
                    transmission.backlog.clone(),
                    transmission.responses.clone(),
                    Arc::clone(&transport),
                    Arc::clone(&transmission.live_workers),
                );
                handles.push(runtime.spawn(worker.run()));
            }
        }
        *transmission.state.lock() = TransmissionState::Running;

        info!(
            worker_count = transmission.config.max_concurrent_batches,
            max_pending_events = transmission.config.max_pending_events,
            max_pending_responses = transmission.config.max_pending_responses,
            block_on_send = transmission.config.block_on_send,
            block_on_response = transmission.config.block_on_response,
            "transmission started"
        );

        Ok(transmission)
    }

    /// Hands an event to the worker pool.
    ///
    /// The event is copied first; later changes to it are not transmitted.
    /// With `block_on_send` this waits for queue capacity. Otherwise a full
    /// queue drops the event and reports a queue overflow response. Once
    /// every worker has exited, events are answered immediately with a
    /// "no delivery workers left" response.
    ///
    /// # Errors
    ///
    /// Returns `Error::ClientClosed` once shutdown has started.
    pub async fn send(&self, event: &Event) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ClientClosed);
        }
        let pending = event.to_pending();

        if self.live_workers() == 0 {
            warn!(dataset = %pending.dataset, "event dropped; no delivery workers left");
            self.responses.enqueue(Response::no_live_workers(pending.metadata)).await;
            return Ok(());
        }

        if self.config.block_on_send {
            return self.pending.send(pending).await.map_err(|_| Error::ClientClosed);
        }

        match self.pending.try_send(pending) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(pending)) => {
                warn!(dataset = %pending.dataset, "event dropped; queue overflow");
                self.responses.enqueue(Response::queue_overflow(pending.metadata)).await;
                Ok(())
            },
            Err(TrySendError::Closed(_)) => Err(Error::ClientClosed),
        }
    }

    /// Reports a response that did not go through a worker.
    pub(crate) async fn enqueue_response(&self, response: Response) {
        self.responses.enqueue(response).await;
    }

    /// Stops intake, waits for the workers to drain the queue, then closes the
    /// response queue and releases the transport.
    ///
    /// Only the first call does any work; later or concurrent calls return
    /// immediately.
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.lock();
            if *state != TransmissionState::Running {
                return;
            }
            *state = TransmissionState::Disposing;
        }

        info!(
            pending_events = self.pending.len(),
            live_workers = self.live_workers(),
            "transmission shutting down"
        );

        self.pending.close();

        let handles = std::mem::take(&mut *self.worker_handles.lock());
        for (worker_id, handle) in handles.into_iter().enumerate() {
            if let Err(join_error) = handle.await {
                error!(worker_id, error = %join_error, "delivery worker task failed during shutdown");
            }
        }

        let mut stranded = 0_usize;
        while let Ok(pending) = self.backlog.try_recv() {
            stranded += 1;
            self.responses.enqueue(Response::no_live_workers(pending.metadata)).await;
        }
        if stranded > 0 {
            warn!(stranded, "queued events left undelivered after every worker exited");
        }

        self.responses.close();
        self.transport.lock().take();
        *self.state.lock() = TransmissionState::Disposed;

        info!(buffered_responses = self.response_queue.len(), "transmission shut down");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TransmissionState {
        *self.state.lock()
    }

    /// Whether shutdown has started.
    pub fn is_closed(&self) -> bool {
        self.state() != TransmissionState::Running || self.pending.is_closed()
    }

    /// Number of workers that have not exited.
    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::Acquire)
    }

    /// Number of events waiting for a worker.
    pub fn pending_len(&self) -> usize {
        self.backlog.len()
    }

    /// Settings this transmission was created with.
    pub fn config(&self) -> &TransmissionConfig {
        &self.config
    }

    /// Handle on the response queue.
    pub fn responses(&self) -> ResponseQueue {
        self.response_queue.clone()
    }
}

impl fmt::Debug for Transmission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transmission")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("live_workers", &self.live_workers())
            .field("pending_len", &self.pending_len())
            .finish_non_exhaustive()
    }
}

impl Drop for Transmission {
    fn drop(&mut self) {
        if *self.state.get_mut() != TransmissionState::Running {
            return;
        }
        self.pending.close();
        warn!(
            live_workers = self.live_workers(),
            pending_events = self.pending.len(),
            "transmission dropped without shutdown; workers will drain in the background"
        );
        if self.live_workers() == 0 {
            while let Ok(pending) = self.backlog.try_recv() {
                self.responses.try_enqueue(Response::no_live_workers(pending.metadata));
            }
        }
    }
}
