//! HTTP transport for the events ingestion endpoint.
//!
//! One POST per event. Any HTTP status counts as a completed exchange; only
//! failures to get a status and a body back are errors, categorized so the
//! worker can tell expected network trouble from failures that must end it.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use url::Url;

use crate::error::{DeliveryError, Error, Result};

/// Header carrying the write key.
pub const TEAM_HEADER: &str = "X-Hny-Team";
/// Header carrying the sample rate the event was kept at.
pub const SAMPLE_RATE_HEADER: &str = "X-Hny-Samplerate";
/// Header carrying the event creation time.
pub const EVENT_TIME_HEADER: &str = "X-Hny-Event-Time";

/// Default user agent sent with every request.
pub const USER_AGENT: &str = concat!("sonde-rs/", env!("CARGO_PKG_VERSION"));

/// A single event ready to be posted.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Base URL of the ingestion API.
    pub api_host: String,
    /// Dataset the event belongs to.
    pub dataset: String,
    /// Authentication token.
    pub write_key: String,
    /// Sample rate the event was kept at.
    pub sample_rate: u32,
    /// Event creation time.
    pub created_at: DateTime<Utc>,
    /// Gzip-compressed JSON body.
    pub body: Bytes,
}

impl IngestRequest {
    /// Events endpoint for this request: `{api_host}/1/events/{dataset}`.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Fatal` if the host cannot carry a path.
    pub fn url(&self) -> std::result::Result<Url, DeliveryError> {
        let mut url = Url::parse(&self.api_host)
            .map_err(|e| DeliveryError::fatal(format!("invalid api host: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| DeliveryError::fatal(format!("api host cannot be a base: {}", self.api_host)))?
            .pop_if_empty()
            .extend(["1", "events", self.dataset.as_str()]);
        Ok(url)
    }
}

/// A completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response body text.
    pub body: String,
}

/// Something that can post an event to the ingestion API.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Posts one event.
    ///
    /// Returns `Ok` for any HTTP status. Errors are categorized; only
    /// [`DeliveryError::Fatal`] ends the calling worker.
    async fn post(&self, request: IngestRequest) -> std::result::Result<IngestResponse, DeliveryError>;
}

/// [`Transport`] over a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Creates a transport with the given per-request timeout and user agent.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if the HTTP client cannot be built.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, timeout })
    }

    fn categorize(&self, error: &reqwest::Error) -> DeliveryError {
        if error.is_timeout() {
            DeliveryError::timeout(u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX))
        } else if error.is_connect() || error.is_request() {
            DeliveryError::network(error.to_string())
        } else if error.is_body() || error.is_decode() {
            DeliveryError::stream(error.to_string())
        } else {
            DeliveryError::fatal(error.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: IngestRequest) -> std::result::Result<IngestResponse, DeliveryError> {
        let url = request.url()?;

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip")
            .header(TEAM_HEADER, &request.write_key)
            .header(SAMPLE_RATE_HEADER, request.sample_rate.to_string())
            .header(EVENT_TIME_HEADER, request.created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
            .body(request.body)
            .send()
            .await
            .map_err(|e| self.categorize(&e))?;

        let status_code = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.categorize(&e))?;

        Ok(IngestResponse { status_code, body })
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn create_test_request(api_host: String) -> IngestRequest {
        IngestRequest {
            api_host,
            dataset: "test-dataset".to_string(),
            write_key: "test-key".to_string(),
            sample_rate: 3,
            created_at: Utc::now(),
            body: Bytes::from_static(b"payload"),
        }
    }

    #[test]
    fn url_appends_events_path() {
        let request = create_test_request("https://api.example.com".to_string());
        assert_eq!(request.url().unwrap().as_str(), "https://api.example.com/1/events/test-dataset");

        let request = create_test_request("http://localhost:8080/prefix/".to_string());
        assert_eq!(request.url().unwrap().as_str(), "http://localhost:8080/prefix/1/events/test-dataset");
    }

    #[test]
    fn url_encodes_dataset() {
        let mut request = create_test_request("https://api.example.com".to_string());
        request.dataset = "my data/set".to_string();
        assert_eq!(request.url().unwrap().as_str(), "https://api.example.com/1/events/my%20data%2Fset");
    }

    #[test]
    fn user_agent_carries_version() {
        assert!(USER_AGENT.starts_with("sonde-rs/"));
    }

    #[tokio::test]
    async fn post_sends_ingest_headers() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/1/events/test-dataset"))
            .and(matchers::header(TEAM_HEADER, "test-key"))
            .and(matchers::header(SAMPLE_RATE_HEADER, "3"))
            .and(matchers::header_exists(EVENT_TIME_HEADER))
            .and(matchers::header("content-type", "application/json"))
            .and(matchers::header("content-encoding", "gzip"))
            .and(matchers::header("user-agent", USER_AGENT))
            .respond_with(ResponseTemplate::new(202).set_body_string("accepted"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new(Duration::from_secs(5), USER_AGENT).unwrap();
        let response = transport.post(create_test_request(mock_server.uri())).await.unwrap();

        assert_eq!(response, IngestResponse { status_code: 202, body: "accepted".to_string() });
    }

    #[tokio::test]
    async fn error_status_is_a_completed_exchange() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("unknown team"))
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new(Duration::from_secs(5), USER_AGENT).unwrap();
        let response = transport.post(create_test_request(mock_server.uri())).await.unwrap();

        assert_eq!(response.status_code, 400);
        assert_eq!(response.body, "unknown team");
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new(Duration::from_millis(50), USER_AGENT).unwrap();
        let err = transport.post(create_test_request(mock_server.uri())).await.unwrap_err();

        assert!(matches!(err, DeliveryError::Timeout { timeout_ms: 50 }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn refused_connection_is_network_error() {
        let transport = HttpTransport::new(Duration::from_secs(2), USER_AGENT).unwrap();
        let err = transport.post(create_test_request("http://127.0.0.1:1".to_string())).await.unwrap_err();

        assert!(matches!(err, DeliveryError::Network { .. }));
    }
}
