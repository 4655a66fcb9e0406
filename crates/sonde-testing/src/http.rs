//! Mock events ingestion API.

use std::{io::Read, time::Duration};

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use serde_json::Value;
use wiremock::{
    matchers::{method, path_regex},
    Mock, MockServer, Request, ResponseTemplate,
};

/// Ingestion server on a random local port.
///
/// Requests are recorded by the underlying wiremock server and decoded on
/// demand.
pub struct MockIngest {
    server: MockServer,
}

impl MockIngest {
    /// Starts a server that answers every event with `200 OK`.
    pub async fn start() -> Self {
        let ingest = Self { server: MockServer::start().await };
        ingest.respond_with(200, "", None).await;
        ingest
    }

    /// Starts a server without any mounted response.
    pub async fn start_empty() -> Self {
        Self { server: MockServer::start().await }
    }

    /// Base URL to use as the API host.
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Answers events with `status` and `body`, optionally after `delay`.
    ///
    /// Earlier responses are replaced.
    pub async fn respond_with(&self, status: u16, body: &str, delay: Option<Duration>) {
        self.server.reset().await;

        let mut response = ResponseTemplate::new(status).set_body_string(body);
        if let Some(delay) = delay {
            response = response.set_delay(delay);
        }

        Mock::given(method("POST"))
            .and(path_regex(r"^/1/events/[^/]+$"))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    /// Every event received so far, decoded.
    pub async fn received_events(&self) -> Result<Vec<RecordedEvent>> {
        let requests = self.server.received_requests().await.context("request recording is disabled")?;
        requests.iter().map(RecordedEvent::decode).collect()
    }

    /// Polls until at least `count` events arrived or `timeout` elapses.
    pub async fn wait_for_events(&self, count: usize, timeout: Duration) -> Result<Vec<RecordedEvent>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let events = self.received_events().await?;
            if events.len() >= count {
                return Ok(events);
            }
            if tokio::time::Instant::now() >= deadline {
                bail!("expected {count} events, received {}", events.len());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Asserts that exactly `expected` events were received.
    pub async fn assert_event_count(&self, expected: usize) {
        let received = self.received_events().await.map(|events| events.len()).unwrap_or_default();
        assert_eq!(received, expected, "Expected {expected} events, received {received}");
    }
}

/// Decoded ingestion request.
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    /// Request path.
    pub path: String,
    /// Dataset taken from the path.
    pub dataset: String,
    /// `X-Hny-Team` header.
    pub write_key: Option<String>,
    /// `X-Hny-Samplerate` header.
    pub sample_rate: Option<String>,
    /// `X-Hny-Event-Time` header.
    pub event_time: Option<String>,
    /// `User-Agent` header.
    pub user_agent: Option<String>,
    /// `Content-Type` header.
    pub content_type: Option<String>,
    /// `Content-Encoding` header.
    pub content_encoding: Option<String>,
    /// Gunzipped JSON body.
    pub fields: Value,
}

impl RecordedEvent {
    fn decode(request: &Request) -> Result<Self> {
        let header = |name: &str| {
            request.headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_string)
        };

        let mut json = String::new();
        GzDecoder::new(request.body.as_slice())
            .read_to_string(&mut json)
            .context("request body is not gzip")?;
        let fields = serde_json::from_str(&json).context("request body is not JSON")?;

        let path = request.url.path().to_string();
        let dataset = path.rsplit('/').next().unwrap_or_default().to_string();

        Ok(Self {
            dataset,
            path,
            write_key: header("x-hny-team"),
            sample_rate: header("x-hny-samplerate"),
            event_time: header("x-hny-event-time"),
            user_agent: header("user-agent"),
            content_type: header("content-type"),
            content_encoding: header("content-encoding"),
            fields,
        })
    }

    /// Field `name` of the decoded body.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}
