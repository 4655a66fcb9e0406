//! Fixture builders for client configuration.

use std::time::Duration;

use sonde::{ClientConfig, Response, ResponseQueue};

/// Fluent builder for a [`ClientConfig`] pointed at a test server.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: ClientConfig,
}

impl ConfigBuilder {
    /// Starts from defaults with a test write key and dataset.
    pub fn new(api_host: impl Into<String>) -> Self {
        Self { config: ClientConfig::new("test-write-key", "test-dataset").with_api_host(api_host) }
    }

    /// Sets the write key.
    #[must_use]
    pub fn write_key(mut self, write_key: impl Into<String>) -> Self {
        self.config.write_key = write_key.into();
        self
    }

    /// Sets the dataset.
    #[must_use]
    pub fn dataset(mut self, dataset: impl Into<String>) -> Self {
        self.config.dataset = dataset.into();
        self
    }

    /// Sets the sample rate.
    #[must_use]
    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.config.sample_rate = sample_rate;
        self
    }

    /// Sets the number of delivery workers.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.max_concurrent_batches = workers;
        self
    }

    /// Sets both queue capacities.
    #[must_use]
    pub fn capacities(mut self, pending: usize, responses: usize) -> Self {
        self.config.max_pending_events = pending;
        self.config.max_pending_responses = responses;
        self
    }

    /// Sets the blocking policies for sending and for responses.
    #[must_use]
    pub fn blocking(mut self, on_send: bool, on_response: bool) -> Self {
        self.config.block_on_send = on_send;
        self.config.block_on_response = on_response;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Finishes the configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// Takes up to `count` responses, giving up after `timeout` of silence.
pub async fn collect_responses(queue: &ResponseQueue, count: usize, timeout: Duration) -> Vec<Response> {
    let mut responses = Vec::with_capacity(count);
    while responses.len() < count {
        match queue.take_timeout(timeout).await {
            Some(response) => responses.push(response),
            None => break,
        }
    }
    responses
}
