//! Delivery worker: drains the pending queue and reports one response per
//! event.
//!
//! Workers exit when the pending queue is closed and empty, or after the
//! first fatal failure. A worker lost to a fatal failure is not replaced.

use std::{
    any::Any,
    collections::BTreeMap,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use async_channel::Receiver;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    error::{DeliveryError, ErrorCategory},
    payload,
    response::{Response, ResponseSink},
    transport::{IngestRequest, Transport},
};

/// Immutable copy of an event taken when it is handed to the transmission.
#[derive(Debug, Clone)]
pub(crate) struct PendingEvent {
    pub(crate) api_host: String,
    pub(crate) dataset: String,
    pub(crate) write_key: String,
    pub(crate) sample_rate: u32,
    pub(crate) fields: BTreeMap<String, Value>,
    pub(crate) metadata: Option<Value>,
    pub(crate) created_at: DateTime<Utc>,
}

impl PendingEvent {
    fn to_request(&self) -> Result<IngestRequest, DeliveryError> {
        Ok(IngestRequest {
            api_host: self.api_host.clone(),
            dataset: self.dataset.clone(),
            write_key: self.write_key.clone(),
            sample_rate: self.sample_rate,
            created_at: self.created_at,
            body: payload::encode(&self.fields)?,
        })
    }
}

/// What a single delivery attempt produced.
enum Outcome {
    Delivered { status_code: u16, body: String, duration: Duration },
    Failed { error: DeliveryError, duration: Duration },
}

/// One long-lived member of the transmission's worker pool.
pub(crate) struct DeliveryWorker {
    id: usize,
    pending: Receiver<PendingEvent>,
    responses: ResponseSink,
    transport: Arc<dyn Transport>,
    live_workers: Arc<AtomicUsize>,
}

impl DeliveryWorker {
    pub(crate) fn new(
        id: usize,
        pending: Receiver<PendingEvent>,
        responses: ResponseSink,
        transport: Arc<dyn Transport>,
        live_workers: Arc<AtomicUsize>,
    ) -> Self {
        Self { id, pending, responses, transport, live_workers }
    }

    /// Main worker loop. Returns when the queue is closed and drained or a
    /// fatal failure occurred.
    pub(crate) async fn run(self) {
        info!(worker_id = self.id, "delivery worker starting");

        while let Ok(event) = self.pending.recv().await {
            let metadata = event.metadata.clone();
            let span = info_span!("event_delivery", worker_id = self.id, dataset = %event.dataset);

            let started = Instant::now();
            let attempt = AssertUnwindSafe(self.deliver(&event).instrument(span)).catch_unwind().await;

            match attempt {
                Ok(Outcome::Delivered { status_code, body, duration }) => {
                    debug!(
                        worker_id = self.id,
                        status = status_code,
                        duration_ms = duration.as_millis(),
                        "event delivered"
                    );
                    self.responses.enqueue(Response::delivered(status_code, body, duration, metadata)).await;
                },
                Ok(Outcome::Failed { error, duration }) if !error.is_fatal() => {
                    warn!(
                        worker_id = self.id,
                        category = %ErrorCategory::from(&error),
                        error = %error,
                        duration_ms = duration.as_millis(),
                        "event delivery failed"
                    );
                    self.responses.enqueue(Response::failed(error.response_message(), duration, metadata)).await;
                },
                Ok(Outcome::Failed { error, duration }) => {
                    error!(worker_id = self.id, error = %error, "delivery worker hit a fatal error");
                    self.responses.enqueue(Response::failed(error.response_message(), duration, metadata)).await;
                    break;
                },
                Err(panic) => {
                    let error = DeliveryError::fatal(panic_message(panic.as_ref()));
                    error!(worker_id = self.id, error = %error, "delivery worker panicked");
                    self.responses.enqueue(Response::failed(error.response_message(), started.elapsed(), metadata)).await;
                    break;
                },
            }
        }

        let remaining = self.live_workers.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        info!(worker_id = self.id, live_workers = remaining, "delivery worker stopped");
    }

    async fn deliver(&self, event: &PendingEvent) -> Outcome {
        let request = match event.to_request() {
            Ok(request) => request,
            Err(error) => return Outcome::Failed { error, duration: Duration::ZERO },
        };

        let start = Instant::now();
        let result = self.transport.post(request).await;
        let duration = start.elapsed();

        match result {
            Ok(response) => {
                Outcome::Delivered { status_code: response.status_code, body: response.body, duration }
            },
            Err(error) => Outcome::Failed { error, duration },
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "delivery panicked".to_string()
    }
}
