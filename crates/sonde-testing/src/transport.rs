//! Scripted transports for driving the worker pool without a network.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use sonde::{DeliveryError, IngestRequest, IngestResponse, Transport};

/// How a scripted delivery fails.
#[derive(Debug, Clone)]
pub enum FailureKind {
    /// Connection refused.
    Network,
    /// Request timed out.
    Timeout,
    /// Response body could not be read.
    Stream,
    /// Unexpected failure that ends the worker.
    Fatal(String),
    /// Delivery panics with the given message.
    Panic(String),
}

#[derive(Debug, Clone)]
enum Script {
    Respond { status_code: u16, body: String },
    Fail(FailureKind),
}

/// [`Transport`] answering every request the same way.
#[derive(Debug, Clone)]
pub struct ScriptedTransport {
    script: Script,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    /// Answers every request with `status_code` and `body`.
    pub fn respond(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            script: Script::Respond { status_code, body: body.into() },
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fails every request with `kind`.
    pub fn fail(kind: FailureKind) -> Self {
        Self { script: Script::Fail(kind), delay: None, calls: Arc::new(AtomicUsize::new(0)) }
    }

    /// Waits `delay` before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of requests received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Boxes the transport for client or transmission construction, keeping
    /// a handle for call counting.
    pub fn shared(self) -> (Arc<dyn Transport>, Self) {
        (Arc::new(self.clone()), self)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post(&self, _request: IngestRequest) -> Result<IngestResponse, DeliveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.script {
            Script::Respond { status_code, body } => {
                Ok(IngestResponse { status_code: *status_code, body: body.clone() })
            },
            Script::Fail(FailureKind::Network) => Err(DeliveryError::network("connection refused")),
            Script::Fail(FailureKind::Timeout) => Err(DeliveryError::timeout(0)),
            Script::Fail(FailureKind::Stream) => Err(DeliveryError::stream("unexpected end of stream")),
            Script::Fail(FailureKind::Fatal(message)) => Err(DeliveryError::fatal(message.clone())),
            #[allow(clippy::panic)]
            Script::Fail(FailureKind::Panic(message)) => panic!("{message}"),
        }
    }
}
