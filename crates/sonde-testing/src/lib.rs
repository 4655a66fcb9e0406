//! Test infrastructure for the event client.
//!
//! Provides a mock ingestion server that decodes what it receives, scripted
//! transports for exercising the worker pool without a network, and fixture
//! builders for client configuration.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod fixtures;
pub mod http;
pub mod transport;

pub use fixtures::{collect_responses, ConfigBuilder};
pub use http::{MockIngest, RecordedEvent};
pub use transport::{FailureKind, ScriptedTransport};

/// Installs a test-friendly tracing subscriber once per process.
///
/// Filtering follows `RUST_LOG` and defaults to `error`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("error")),
        )
        .with_test_writer()
        .try_init();
}
