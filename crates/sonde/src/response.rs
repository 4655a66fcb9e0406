//! Delivery outcomes and the queue they are reported on.
//!
//! Every event accepted by the transmission yields exactly one [`Response`]:
//! a sampling drop, a queue overflow, an HTTP result, or a failure. Responses
//! are read from a bounded [`ResponseQueue`]; when the client closes, the
//! queue stops accepting new responses but keeps what is already buffered.

use std::{fmt, time::Duration};

use async_channel::{Receiver, Sender, TryRecvError, TrySendError};
use futures::Stream;
use serde_json::Value;
use tracing::debug;

/// Message recorded when an event loses the sampling draw.
pub const DROPPED_BY_SAMPLING: &str = "Event dropped due to sampling";

/// Message recorded when the pending queue is full under non-blocking send.
pub const QUEUE_OVERFLOW: &str = "Event dropped; queue overflow";

/// Message recorded for an accepted event left with no worker to deliver it.
pub const NO_LIVE_WORKERS: &str = "Event dropped; no delivery workers left";

/// Outcome of a single event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Response {
    /// HTTP status of the ingestion request, if one completed.
    pub status_code: Option<u16>,
    /// Wall-clock time spent on the network call.
    pub duration: Duration,
    /// Caller metadata copied verbatim from the event.
    pub metadata: Option<Value>,
    /// Response body text.
    pub body: Option<String>,
    /// Why the event was not delivered.
    pub error_message: Option<String>,
}

impl Response {
    /// Response for an event discarded by the sampling draw.
    pub fn dropped_by_sampling(metadata: Option<Value>) -> Self {
        Self { metadata, error_message: Some(DROPPED_BY_SAMPLING.to_string()), ..Self::default() }
    }

    /// Response for an event rejected because the pending queue was full.
    pub fn queue_overflow(metadata: Option<Value>) -> Self {
        Self { metadata, error_message: Some(QUEUE_OVERFLOW.to_string()), ..Self::default() }
    }

    /// Response for an event stranded after every delivery worker exited.
    pub fn no_live_workers(metadata: Option<Value>) -> Self {
        Self { metadata, error_message: Some(NO_LIVE_WORKERS.to_string()), ..Self::default() }
    }

    /// Response for a completed HTTP exchange, whatever its status.
    pub fn delivered(
        status_code: u16,
        body: String,
        duration: Duration,
        metadata: Option<Value>,
    ) -> Self {
        Self { status_code: Some(status_code), duration, metadata, body: Some(body), error_message: None }
    }

    /// Response for a failed delivery attempt.
    pub fn failed(message: String, duration: Duration, metadata: Option<Value>) -> Self {
        Self { duration, metadata, error_message: Some(message), ..Self::default() }
    }

    /// Whether an HTTP exchange completed.
    pub fn is_delivered(&self) -> bool {
        self.status_code.is_some()
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.status_code.map(|s| s.to_string()).unwrap_or_default();
        write!(
            f,
            "[Response: status_code={status}, duration={:?}, error_message={}]",
            self.duration,
            self.error_message.as_deref().unwrap_or_default()
        )
    }
}

/// Producer side of the response queue with its enqueue policy.
///
/// Blocking sinks wait for capacity; non-blocking sinks discard the response
/// when the queue is full. Responses offered after close are discarded.
#[derive(Debug, Clone)]
pub(crate) struct ResponseSink {
    sender: Sender<Response>,
    block: bool,
}

impl ResponseSink {
    pub(crate) fn new(sender: Sender<Response>, block: bool) -> Self {
        Self { sender, block }
    }

    pub(crate) async fn enqueue(&self, response: Response) {
        if self.block {
            if self.sender.send(response).await.is_err() {
                debug!("response discarded; response queue closed");
            }
            return;
        }

        self.try_enqueue(response);
    }

    /// Enqueues without waiting, discarding the response when the queue is
    /// full or closed.
    pub(crate) fn try_enqueue(&self, response: Response) {
        match self.sender.try_send(response) {
            Ok(()) => {},
            Err(TrySendError::Full(_)) => debug!("response discarded; response queue full"),
            Err(TrySendError::Closed(_)) => debug!("response discarded; response queue closed"),
        }
    }

    pub(crate) fn close(&self) {
        self.sender.close();
    }
}

/// Consumer handle on the bounded response queue.
///
/// Handles are cheap to clone; each response is received by exactly one of
/// them.
#[derive(Debug, Clone)]
pub struct ResponseQueue {
    receiver: Receiver<Response>,
}

impl ResponseQueue {
    pub(crate) fn new(receiver: Receiver<Response>) -> Self {
        Self { receiver }
    }

    /// Waits for the next response.
    ///
    /// Returns `None` once the queue is closed for adding and drained.
    pub async fn take(&self) -> Option<Response> {
        self.receiver.recv().await.ok()
    }

    /// Blocking variant of [`take`](Self::take) for synchronous consumers.
    ///
    /// Must not be called from within an async task.
    pub fn take_blocking(&self) -> Option<Response> {
        self.receiver.recv_blocking().ok()
    }

    /// Returns a buffered response without waiting.
    pub fn try_take(&self) -> Option<Response> {
        match self.receiver.try_recv() {
            Ok(response) => Some(response),
            Err(TryRecvError::Empty | TryRecvError::Closed) => None,
        }
    }

    /// Waits up to `timeout` for the next response.
    pub async fn take_timeout(&self, timeout: Duration) -> Option<Response> {
        tokio::time::timeout(timeout, self.take()).await.ok().flatten()
    }

    /// Drains the responses buffered right now.
    pub fn try_iter(&self) -> impl Iterator<Item = Response> + '_ {
        std::iter::from_fn(move || self.try_take())
    }

    /// Stream of responses that ends once the queue is completed.
    pub fn stream(&self) -> impl Stream<Item = Response> {
        self.receiver.clone()
    }

    /// Number of buffered responses.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Whether no responses are buffered.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Maximum number of buffered responses.
    pub fn capacity(&self) -> Option<usize> {
        self.receiver.capacity()
    }

    /// Whether the producer side has been closed.
    pub fn is_adding_completed(&self) -> bool {
        self.receiver.is_closed()
    }

    /// Whether the queue is closed and every response has been taken.
    pub fn is_completed(&self) -> bool {
        self.receiver.is_closed() && self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use serde_json::json;

    use super::*;

    #[test]
    fn display_format() {
        let response = Response::delivered(202, "ok".into(), Duration::from_millis(5), None);
        assert_eq!(
            response.to_string(),
            "[Response: status_code=202, duration=5ms, error_message=]"
        );

        let response = Response::queue_overflow(None);
        assert_eq!(
            response.to_string(),
            "[Response: status_code=, duration=0ns, error_message=Event dropped; queue overflow]"
        );
    }

    #[test]
    fn drop_responses_carry_metadata_and_no_status() {
        let response = Response::dropped_by_sampling(Some(json!({"id": 7})));

        assert_eq!(response.metadata, Some(json!({"id": 7})));
        assert_eq!(response.error_message.as_deref(), Some(DROPPED_BY_SAMPLING));
        assert_eq!(response.duration, Duration::ZERO);
        assert!(!response.is_delivered());
    }

    #[tokio::test]
    async fn closed_queue_keeps_buffered_responses() {
        let (tx, rx) = async_channel::bounded(4);
        let queue = ResponseQueue::new(rx);

        tx.send(Response::queue_overflow(Some(json!(1)))).await.unwrap();
        tx.send(Response::queue_overflow(Some(json!(2)))).await.unwrap();
        tx.close();

        assert!(queue.is_adding_completed());
        assert!(!queue.is_completed());
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.capacity(), Some(4));

        assert_eq!(queue.take().await.unwrap().metadata, Some(json!(1)));
        assert_eq!(queue.try_take().unwrap().metadata, Some(json!(2)));
        assert!(queue.take().await.is_none());
        assert!(queue.is_completed());
    }

    #[tokio::test]
    async fn take_timeout_returns_none_when_idle() {
        let (_tx, rx) = async_channel::bounded::<Response>(1);
        let queue = ResponseQueue::new(rx);

        assert!(queue.take_timeout(Duration::from_millis(20)).await.is_none());
        assert!(!queue.is_adding_completed());
    }

    #[tokio::test]
    async fn stream_ends_on_completion() {
        let (tx, rx) = async_channel::bounded(8);
        let queue = ResponseQueue::new(rx);

        for i in 0..3 {
            tx.send(Response::dropped_by_sampling(Some(json!(i)))).await.unwrap();
        }
        drop(tx);

        let collected: Vec<_> = queue.stream().collect().await;
        assert_eq!(collected.len(), 3);
    }

    #[test]
    fn try_iter_drains_without_waiting() {
        let (tx, rx) = async_channel::bounded(8);
        let queue = ResponseQueue::new(rx);
        tx.try_send(Response::default()).unwrap();
        tx.try_send(Response::default()).unwrap();

        assert_eq!(queue.try_iter().count(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn non_blocking_sink_discards_when_full() {
        let (tx, rx) = async_channel::bounded(1);
        let queue = ResponseQueue::new(rx);
        let sink = ResponseSink::new(tx, false);

        sink.try_enqueue(Response::no_live_workers(Some(json!("first"))));
        sink.try_enqueue(Response::no_live_workers(Some(json!("second"))));

        let kept = queue.try_take().unwrap();
        assert_eq!(kept.metadata, Some(json!("first")));
        assert_eq!(kept.error_message.as_deref(), Some(NO_LIVE_WORKERS));
        assert!(queue.try_take().is_none());
    }
}
