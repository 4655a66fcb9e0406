//! Client configuration with defaults, file, and environment overrides.

use std::{path::Path, time::Duration};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    error::{Error, Result},
    transmission::TransmissionConfig,
};

const CONFIG_FILE: &str = "sonde.toml";
const ENV_PREFIX: &str = "SONDE_";

/// Default ingestion API host.
pub const DEFAULT_API_HOST: &str = "https://api.honeycomb.io";

/// Default sample rate. A rate of 1 keeps every event.
pub const DEFAULT_SAMPLE_RATE: u32 = 1;

/// Complete client configuration.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables prefixed with `SONDE_` (highest priority)
/// 2. Configuration file (`sonde.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// # Example
///
/// ```no_run
/// use sonde::ClientConfig;
///
/// let config = ClientConfig::load().expect("failed to load configuration");
/// println!("sending to {} / {}", config.api_host, config.dataset);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    // Routing
    /// Authentication token sent with every event.
    ///
    /// Environment variable: `SONDE_WRITE_KEY`
    #[serde(default)]
    pub write_key: String,
    /// Dataset events are sent to.
    ///
    /// Environment variable: `SONDE_DATASET`
    #[serde(default)]
    pub dataset: String,
    /// Base URL of the ingestion API, `http` or `https`.
    ///
    /// Environment variable: `SONDE_API_HOST`
    #[serde(default = "default_api_host")]
    pub api_host: String,
    /// Keep one event out of every `sample_rate` sent.
    ///
    /// Environment variable: `SONDE_SAMPLE_RATE`
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    // Transmission
    /// Number of delivery workers.
    ///
    /// Environment variable: `SONDE_MAX_CONCURRENT_BATCHES`
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,
    /// Wait for queue space instead of dropping events on overflow.
    ///
    /// Environment variable: `SONDE_BLOCK_ON_SEND`
    #[serde(default)]
    pub block_on_send: bool,
    /// Wait for response queue space instead of discarding responses.
    ///
    /// Environment variable: `SONDE_BLOCK_ON_RESPONSE`
    #[serde(default)]
    pub block_on_response: bool,
    /// Per-request timeout in milliseconds.
    ///
    /// Environment variable: `SONDE_TIMEOUT_MS`
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Capacity of the pending event queue.
    ///
    /// Environment variable: `SONDE_MAX_PENDING_EVENTS`
    #[serde(default = "default_max_pending_events")]
    pub max_pending_events: usize,
    /// Capacity of the response queue.
    ///
    /// Environment variable: `SONDE_MAX_PENDING_RESPONSES`
    #[serde(default = "default_max_pending_responses")]
    pub max_pending_responses: usize,
}

impl ClientConfig {
    /// Creates a configuration with the given routing and default settings.
    pub fn new(write_key: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self { write_key: write_key.into(), dataset: dataset.into(), ..Self::default() }
    }

    /// Sets the API host.
    pub fn with_api_host(mut self, api_host: impl Into<String>) -> Self {
        self.api_host = api_host.into();
        self
    }

    /// Sets the sample rate.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Applies the transmission settings of `transmission`.
    pub fn with_transmission(mut self, transmission: &TransmissionConfig) -> Self {
        self.max_concurrent_batches = transmission.max_concurrent_batches;
        self.block_on_send = transmission.block_on_send;
        self.block_on_response = transmission.block_on_response;
        self.timeout_ms = u64::try_from(transmission.timeout.as_millis()).unwrap_or(u64::MAX);
        self.max_pending_events = transmission.max_pending_events;
        self.max_pending_responses = transmission.max_pending_responses;
        self
    }

    /// Loads configuration from `sonde.toml` and the environment.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if a source cannot be parsed or the
    /// result fails validation.
    pub fn load() -> Result<Self> {
        Self::load_from(CONFIG_FILE)
    }

    /// Loads configuration from the given TOML file and the environment.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if a source cannot be parsed or the
    /// result fails validation.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::configuration(format!("failed to load configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Builds the transmission settings described by this configuration.
    pub fn to_transmission_config(&self) -> TransmissionConfig {
        TransmissionConfig {
            max_concurrent_batches: self.max_concurrent_batches,
            block_on_send: self.block_on_send,
            block_on_response: self.block_on_response,
            timeout: Duration::from_millis(self.timeout_ms),
            max_pending_events: self.max_pending_events,
            max_pending_responses: self.max_pending_responses,
            ..TransmissionConfig::default()
        }
    }

    /// Checks routing and transmission settings.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` naming the first rejected setting.
    pub fn validate(&self) -> Result<()> {
        validate_api_host(&self.api_host)?;
        validate_sample_rate(self.sample_rate)?;
        self.to_transmission_config().validate()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            write_key: String::new(),
            dataset: String::new(),
            api_host: default_api_host(),
            sample_rate: default_sample_rate(),
            max_concurrent_batches: default_max_concurrent_batches(),
            block_on_send: false,
            block_on_response: false,
            timeout_ms: default_timeout_ms(),
            max_pending_events: default_max_pending_events(),
            max_pending_responses: default_max_pending_responses(),
        }
    }
}

/// Rejects anything but an absolute `http` or `https` URL.
pub(crate) fn validate_api_host(api_host: &str) -> Result<()> {
    let url = Url::parse(api_host)
        .map_err(|e| Error::invalid_argument("api_host", format!("not an absolute URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(Error::invalid_argument("api_host", format!("unsupported scheme `{scheme}`"))),
    }
}

pub(crate) fn validate_sample_rate(sample_rate: u32) -> Result<()> {
    if sample_rate < 1 {
        return Err(Error::invalid_argument("sample_rate", "must be at least 1"));
    }
    Ok(())
}

fn default_api_host() -> String {
    DEFAULT_API_HOST.to_string()
}

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

fn default_max_concurrent_batches() -> usize {
    crate::DEFAULT_MAX_CONCURRENT_BATCHES
}

fn default_timeout_ms() -> u64 {
    crate::DEFAULT_TIMEOUT_MS
}

fn default_max_pending_events() -> usize {
    crate::DEFAULT_MAX_PENDING_EVENTS
}

fn default_max_pending_responses() -> usize {
    crate::DEFAULT_MAX_PENDING_RESPONSES
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ClientConfig::default();
        assert_eq!(config.api_host, DEFAULT_API_HOST);
        assert_eq!(config.sample_rate, 1);
        assert_eq!(config.max_concurrent_batches, 10);
        assert!(!config.block_on_send);
        assert!(!config.block_on_response);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn api_host_must_be_http_or_https() {
        assert!(validate_api_host("https://api.example.com").is_ok());
        assert!(validate_api_host("http://127.0.0.1:8080").is_ok());
        assert!(validate_api_host("ftp://example.com").is_err());
        assert!(validate_api_host("not a url").is_err());
        assert!(validate_api_host("/relative/path").is_err());
    }

    #[test]
    fn zero_sample_rate_rejected() {
        let config = ClientConfig::new("key", "dataset").with_sample_rate(0);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { name: "sample_rate", .. }));
    }

    #[test]
    fn zero_workers_rejected() {
        let config = ClientConfig { max_concurrent_batches: 0, ..ClientConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn transmission_config_carries_settings() {
        let config = ClientConfig {
            max_concurrent_batches: 3,
            block_on_send: true,
            timeout_ms: 250,
            max_pending_events: 7,
            max_pending_responses: 9,
            ..ClientConfig::default()
        };

        let transmission = config.to_transmission_config();
        assert_eq!(transmission.max_concurrent_batches, 3);
        assert!(transmission.block_on_send);
        assert!(!transmission.block_on_response);
        assert_eq!(transmission.timeout, Duration::from_millis(250));
        assert_eq!(transmission.max_pending_events, 7);
        assert_eq!(transmission.max_pending_responses, 9);

        let round_trip = ClientConfig::default().with_transmission(&transmission);
        assert_eq!(round_trip.to_transmission_config(), transmission);
    }

    #[test]
    fn load_layers_file_and_environment() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "sonde.toml",
                r#"
                    write_key = "from-file"
                    dataset = "file-dataset"
                    sample_rate = 4
                "#,
            )?;
            jail.set_env("SONDE_DATASET", "env-dataset");
            jail.set_env("SONDE_BLOCK_ON_SEND", "true");

            let config = ClientConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.write_key, "from-file");
            assert_eq!(config.dataset, "env-dataset");
            assert_eq!(config.sample_rate, 4);
            assert!(config.block_on_send);
            assert_eq!(config.api_host, DEFAULT_API_HOST);
            Ok(())
        });
    }

    #[test]
    fn load_rejects_invalid_values() {
        Jail::expect_with(|jail| {
            jail.set_env("SONDE_API_HOST", "gopher://example.com");
            assert!(ClientConfig::load().is_err());
            Ok(())
        });
    }
}
