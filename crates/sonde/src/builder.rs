//! Event templates.
//!
//! A [`Builder`] holds fields and producers shared by many events. Its write
//! key, dataset and sample rate are frozen when it is created; the API host
//! is read from the client each time an event is built.

use serde::Serialize;
use serde_json::Value;

use crate::{
    client::Client,
    error::Result,
    event::Event,
    fields::{DynamicField, FieldHolder},
};

/// Template producing [`Event`]s with a common set of fields.
#[derive(Debug, Clone)]
pub struct Builder {
    client: Client,
    fields: FieldHolder,
    write_key: String,
    dataset: String,
    sample_rate: u32,
}

impl Builder {
    /// Creates a builder seeded with the client's global fields and routing.
    pub fn new(client: &Client) -> Self {
        let routing = client.routing();
        Self {
            client: client.clone(),
            fields: client.global_fields(),
            write_key: routing.write_key,
            dataset: routing.dataset,
            sample_rate: routing.sample_rate,
        }
    }

    /// Creates a builder with extra static fields and producers on top of
    /// the client's globals. Producers run again for every event.
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
        let mut builder = Self::new(client);
        builder.fields.add_all(data)?;
        for (name, producer) in dynamic {
            builder.fields.add_dynamic_field(name, move || producer())?;
        }
        Ok(builder)
    }

    /// Adds a static field to every future event.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for an empty name or an
    /// unserializable value.
    pub fn add_field<T: Serialize>(&mut self, name: impl Into<String>, value: T) -> Result<()> {
        self.fields.add_field(name, value)
    }

    /// Adds every `(name, value)` pair to every future event.
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

    /// Registers a producer invoked once per built event.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if `name` is empty.
    pub fn add_dynamic_field<F>(&mut self, name: impl Into<String>, producer: F) -> Result<()>
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.fields.add_dynamic_field(name, producer)
    }

    /// Builds an event from this template.
    pub fn new_event(&self) -> Event {
        Event::from_holder(
            &self.client,
            &self.fields,
            self.write_key.clone(),
            self.dataset.clone(),
            self.sample_rate,
        )
    }

    /// Builds an event, adds `data` and sends it.
    ///
    /// # Errors
    ///
    /// Returns the field or send error of the built event.
    pub async fn send_now<I, K, T>(&self, data: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Serialize,
    {
        let mut event = self.new_event();
        event.add_all(data)?;
        event.send().await
    }

    /// Fields and producers of this template.
    pub fn fields(&self) -> &FieldHolder {
        &self.fields
    }

    /// Frozen authentication token.
    pub fn write_key(&self) -> &str {
        &self.write_key
    }

    /// Frozen dataset.
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Frozen sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
