//! Shared client context.
//!
//! A [`Client`] carries the routing defaults, the global fields added to
//! every event, and the [`Transmission`] that delivers them. Clones share the
//! same state; closing any clone closes them all.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::{
    builder::Builder,
    config::{validate_api_host, validate_sample_rate, ClientConfig},
    error::Result,
    event::Event,
    fields::FieldHolder,
    response::ResponseQueue,
    transmission::Transmission,
    transport::Transport,
};

/// Routing defaults copied into events and builders when they are created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Routing {
    pub(crate) write_key: String,
    pub(crate) dataset: String,
    pub(crate) api_host: String,
    pub(crate) sample_rate: u32,
}

#[derive(Debug)]
struct ClientInner {
    routing: RwLock<Routing>,
    fields: RwLock<FieldHolder>,
    transmission: Transmission,
}

/// Entry point for creating and sending events.
///
/// # Example
///
/// ```no_run
/// use sonde::{Client, ClientConfig};
///
/// # async fn run() -> sonde::Result<()> {
/// let client = Client::new(ClientConfig::new("write-key", "my-dataset"))?;
/// client.add_field("service", "checkout")?;
///
/// client.send_now([("duration_ms", 12)]).await?;
///
/// client.close().await;
/// while let Some(response) = client.responses().take().await {
///     println!("{response}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Creates a client and starts its delivery workers.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for an unusable setting and
    /// `Error::Configuration` outside a tokio runtime.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transmission = Transmission::new(config.to_transmission_config())?;
        Ok(Self::assemble(config, transmission))
    }

    /// Creates a client delivering through `transport`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for an unusable setting and
    /// `Error::Configuration` outside a tokio runtime.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let transmission = Transmission::with_transport(config.to_transmission_config(), transport)?;
        Ok(Self::assemble(config, transmission))
    }

    /// Creates a client from `sonde.toml` and `SONDE_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if configuration cannot be loaded, and
    /// the errors of [`Client::new`].
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::load()?)
    }

    fn assemble(config: ClientConfig, transmission: Transmission) -> Self {
        info!(dataset = %config.dataset, api_host = %config.api_host, sample_rate = config.sample_rate, "client created");

        let routing = Routing {
            write_key: config.write_key,
            dataset: config.dataset,
            api_host: config.api_host,
            sample_rate: config.sample_rate,
        };
        Self {
            inner: Arc::new(ClientInner {
                routing: RwLock::new(routing),
                fields: RwLock::new(FieldHolder::new()),
                transmission,
            }),
        }
    }

    /// Adds a field to every event created from now on.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for an empty name or an
    /// unserializable value.
    pub fn add_field<T: Serialize>(&self, name: impl Into<String>, value: T) -> Result<()> {
        self.inner.fields.write().add_field(name, value)
    }

    /// Adds every `(name, value)` pair to every event created from now on.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for an empty name or an
    /// unserializable value; nothing is added in that case.
    pub fn add_all<I, K, T>(&self, data: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Serialize,
    {
        self.inner.fields.write().add_all(data)
    }

    /// Registers a producer invoked once for every event created from now on.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if `name` is empty.
    pub fn add_dynamic_field<F>(&self, name: impl Into<String>, producer: F) -> Result<()>
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.inner.fields.write().add_dynamic_field(name, producer)
    }

    /// Copy of the global fields and producers.
    pub fn global_fields(&self) -> FieldHolder {
        self.inner.fields.read().clone()
    }

    pub(crate) fn routing(&self) -> Routing {
        self.inner.routing.read().clone()
    }

    /// Default authentication token.
    pub fn write_key(&self) -> String {
        self.inner.routing.read().write_key.clone()
    }

    /// Changes the default authentication token for new events and builders.
    pub fn set_write_key(&self, write_key: impl Into<String>) {
        self.inner.routing.write().write_key = write_key.into();
    }

    /// Default dataset.
    pub fn dataset(&self) -> String {
        self.inner.routing.read().dataset.clone()
    }

    /// Changes the default dataset for new events and builders.
    pub fn set_dataset(&self, dataset: impl Into<String>) {
        self.inner.routing.write().dataset = dataset.into();
    }

    /// Ingestion API host.
    pub fn api_host(&self) -> String {
        self.inner.routing.read().api_host.clone()
    }

    /// Changes the API host for new events, including those built by
    /// existing builders.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` unless `api_host` is an absolute
    /// `http` or `https` URL.
    pub fn set_api_host(&self, api_host: impl Into<String>) -> Result<()> {
        let api_host = api_host.into();
        validate_api_host(&api_host)?;
        self.inner.routing.write().api_host = api_host;
        Ok(())
    }

    /// Default sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.inner.routing.read().sample_rate
    }

    /// Changes the default sample rate for new events and builders.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if `sample_rate` is 0.
    pub fn set_sample_rate(&self, sample_rate: u32) -> Result<()> {
        validate_sample_rate(sample_rate)?;
        self.inner.routing.write().sample_rate = sample_rate;
        Ok(())
    }

    /// Creates an event from the current globals and routing.
    pub fn new_event(&self) -> Event {
        Event::new(self)
    }

    /// Creates a builder from the current globals and routing.
    pub fn new_builder(&self) -> Builder {
        Builder::new(self)
    }

    /// Creates an event with `data` and sends it.
    ///
    /// # Errors
    ///
    /// Returns the field or send error of the created event.
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

    /// Creates an event with a single field and sends it.
    ///
    /// # Errors
    ///
    /// Returns the field or send error of the created event.
    pub async fn send_field_now<T: Serialize>(&self, name: impl Into<String>, value: T) -> Result<()> {
        let mut event = self.new_event();
        event.add_field(name, value)?;
        event.send().await
    }

    /// Handle on the response queue.
    pub fn responses(&self) -> ResponseQueue {
        self.inner.transmission.responses()
    }

    /// The delivery engine behind this client.
    pub fn transmission(&self) -> &Transmission {
        &self.inner.transmission
    }

    /// Flushes queued events and stops delivery. Later calls return at once.
    pub async fn close(&self) {
        self.inner.transmission.shutdown().await;
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.transmission.is_closed()
    }
}
