//! A single telemetry event and its send path.
//!
//! An [`Event`] starts from a snapshot of the client: its routing defaults
//! and its global fields, with global producers evaluated once. Routing can
//! be overridden per event. Sending checks the event synchronously, applies
//! the sampling draw and hands a copy to the client's transmission.

use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::{
    client::Client,
    config::validate_api_host,
    error::{Error, Result},
    fields::{DynamicField, FieldHolder},
    response::Response,
    worker::PendingEvent,
};

/// Whether an event sent at `sample_rate` survives the sampling draw.
///
/// Rates of 0 and 1 keep every event without drawing. A rate of `n` keeps an
/// event with probability `1/n`.
pub fn keep_sample(sample_rate: u32) -> bool {
    sample_rate <= 1 || rand::rng().random_range(1..=sample_rate) == 1
}

/// Structured telemetry event bound to a [`Client`].
#[derive(Debug, Clone)]
pub struct Event {
    client: Client,
    fields: FieldHolder,
    write_key: String,
    dataset: String,
    api_host: String,
    sample_rate: u32,
    metadata: Option<Value>,
    created_at: DateTime<Utc>,
}

impl Event {
    /// Creates an event carrying the client's global fields and routing.
    pub fn new(client: &Client) -> Self {
        let routing = client.routing();
        Self {
            client: client.clone(),
            fields: client.global_fields().into_evaluated(),
            write_key: routing.write_key,
            dataset: routing.dataset,
            api_host: routing.api_host,
            sample_rate: routing.sample_rate,
            metadata: None,
            created_at: Utc::now(),
        }
    }

    /// Creates an event from the client's global fields, then `data`, then
    /// the values of `dynamic`. Each producer is invoked once.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for an empty field name or an
    /// unserializable value.
    pub fn with_fields<I, K, T, D, N>(client: &Client, data: I, dynamic: D) -> Result<Self>
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Serialize,
        D: IntoIterator<Item = (N, DynamicField)>,
        N: Into<String>,
    {
        let mut event = Self::new(client);
        event.fields.add_all(data)?;
        for (name, producer) in dynamic {
            event.fields.add_field(name, producer())?;
        }
        Ok(event)
    }

    /// Creates an event from an already merged holder, evaluating its
    /// producers once.
    pub(crate) fn from_holder(
        client: &Client,
        holder: &FieldHolder,
        write_key: String,
        dataset: String,
        sample_rate: u32,
    ) -> Self {
        Self {
            client: client.clone(),
            fields: holder.clone().into_evaluated(),
            write_key,
            dataset,
            api_host: client.routing().api_host,
            sample_rate,
            metadata: None,
            created_at: Utc::now(),
        }
    }

    /// Adds a field, replacing any previous value under `name`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for an empty name or an
    /// unserializable value.
    pub fn add_field<T: Serialize>(&mut self, name: impl Into<String>, value: T) -> Result<()> {
        self.fields.add_field(name, value)
    }

    /// Adds every `(name, value)` pair.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for an empty name or an
    /// unserializable value; nothing is added in that case.
    pub fn add_all<I, K, T>(&mut self, data: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Serialize,
    {
        self.fields.add_all(data)
    }

    /// Applies the sampling draw, then sends the event if it survives.
    ///
    /// A dropped event reports a "dropped due to sampling" response. Every
    /// check below runs before the draw, so an event that fails one of them
    /// is rejected at any sample rate and never yields a drop response.
    ///
    /// # Errors
    ///
    /// Returns an error, without queueing anything, if the client is closed,
    /// the event has no fields, or routing is incomplete or malformed.
    pub async fn send(&self) -> Result<()> {
        self.check_sendable()?;

        if !keep_sample(self.sample_rate) {
            debug!(dataset = %self.dataset, sample_rate = self.sample_rate, "event dropped due to sampling");
            self.client
                .transmission()
                .enqueue_response(Response::dropped_by_sampling(self.metadata.clone()))
                .await;
            return Ok(());
        }

        self.client.transmission().send(self).await
    }

    /// Sends the event without a sampling draw. The sample rate is still
    /// reported to the server.
    ///
    /// # Errors
    ///
    /// Returns an error, without queueing anything, if the client is closed,
    /// the event has no fields, or routing is incomplete or malformed.
    pub async fn send_presampled(&self) -> Result<()> {
        self.check_sendable()?;
        self.client.transmission().send(self).await
    }

    fn check_sendable(&self) -> Result<()> {
        if self.client.is_closed() {
            return Err(Error::ClientClosed);
        }
        if self.fields.is_empty() {
            return Err(Error::EmptyEvent);
        }
        if self.api_host.is_empty() {
            return Err(Error::MissingApiHost);
        }
        validate_api_host(&self.api_host)?;
        if self.write_key.is_empty() {
            return Err(Error::MissingWriteKey);
        }
        if self.dataset.is_empty() {
            return Err(Error::MissingDataset);
        }
        Ok(())
    }

    pub(crate) fn to_pending(&self) -> PendingEvent {
        PendingEvent {
            api_host: self.api_host.clone(),
            dataset: self.dataset.clone(),
            write_key: self.write_key.clone(),
            sample_rate: self.sample_rate,
            fields: self.fields.fields().clone(),
            metadata: self.metadata.clone(),
            created_at: self.created_at,
        }
    }

    /// Encodes the fields as a JSON object.
    pub fn to_json(&self) -> String {
        self.fields.to_json()
    }

    /// Fields carried by this event.
    pub fn fields(&self) -> &FieldHolder {
        &self.fields
    }

    /// Authentication token.
    pub fn write_key(&self) -> &str {
        &self.write_key
    }

    /// Overrides the authentication token.
    pub fn set_write_key(&mut self, write_key: impl Into<String>) {
        self.write_key = write_key.into();
    }

    /// Target dataset.
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Overrides the target dataset.
    pub fn set_dataset(&mut self, dataset: impl Into<String>) {
        self.dataset = dataset.into();
    }

    /// Ingestion API host.
    pub fn api_host(&self) -> &str {
        &self.api_host
    }

    /// Overrides the ingestion API host. The value is checked when the event
    /// is sent.
    pub fn set_api_host(&mut self, api_host: impl Into<String>) {
        self.api_host = api_host.into();
    }

    /// Sample rate applied by [`send`](Self::send).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Overrides the sample rate. 0 and 1 both disable sampling.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
    }

    /// Caller data returned on this event's response.
    pub fn metadata(&self) -> Option<&Value> {
        self.metadata.as_ref()
    }

    /// Sets caller data returned on this event's response. Never transmitted.
    pub fn set_metadata(&mut self, metadata: Option<Value>) {
        self.metadata = metadata;
    }

    /// When the event was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Creation time as sent in the event time header.
    pub fn created_at_rfc3339(&self) -> String {
        self.created_at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_rates_never_drop() {
        for _ in 0..1000 {
            assert!(keep_sample(0));
            assert!(keep_sample(1));
        }
    }

    #[test]
    fn high_rate_drops_most_events() {
        let kept = (0..10_000).filter(|_| keep_sample(1000)).count();
        assert!(kept < 100, "kept {kept} of 10000 at rate 1000");
    }
}
