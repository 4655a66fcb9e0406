//! Non-blocking telemetry event shipping.
//!
//! This crate accepts structured events from an instrumented process, applies
//! a sampling decision, and delivers them to an events ingestion API in the
//! background, best-effort, without ever blocking or failing the caller on
//! network trouble.
//!
//! # Architecture
//!
//! Events flow through a bounded pipeline owned by the [`Transmission`]:
//!
//! 1. **Build** - an [`Event`] snapshots the [`Client`]'s global fields and
//!    routing, directly or through a [`Builder`] template
//! 2. **Check** - `send` validates the event synchronously and applies the
//!    sampling draw
//! 3. **Queue** - a copy of the event enters the bounded pending queue,
//!    waiting or dropping on overflow depending on configuration
//! 4. **Deliver** - one of a fixed pool of workers gzips the fields and posts
//!    them to `{api_host}/1/events/{dataset}`
//! 5. **Report** - exactly one [`Response`] per accepted event lands on the
//!    bounded [`ResponseQueue`]
//!
//! # Key Features
//!
//! - **Backpressure** - both queues are bounded; overflow is reported, not
//!   hidden
//! - **Failure isolation** - transport failures become responses; a worker
//!   hitting an unexpected failure exits alone
//! - **Graceful Shutdown** - closing drains queued events before the response
//!   queue is closed
//!
//! # Example
//!
//! ```no_run
//! use sonde::{Client, ClientConfig};
//!
//! # async fn example() -> sonde::Result<()> {
//! let client = Client::new(ClientConfig::new("write-key", "requests"))?;
//!
//! let mut builder = client.new_builder();
//! builder.add_field("service", "checkout")?;
//!
//! let mut event = builder.new_event();
//! event.add_field("status", 200)?;
//! event.send().await?;
//!
//! client.close().await;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod fields;
pub mod payload;
pub mod response;
pub mod transmission;
pub mod transport;
mod worker;

// Re-export main public API
pub use builder::Builder;
pub use client::Client;
pub use config::ClientConfig;
pub use error::{DeliveryError, Error, Result};
pub use event::Event;
pub use fields::{DynamicField, FieldHolder};
pub use response::{Response, ResponseQueue};
pub use transmission::{Transmission, TransmissionConfig, TransmissionState};
pub use transport::{HttpTransport, IngestRequest, IngestResponse, Transport};

/// Default number of delivery workers.
pub const DEFAULT_MAX_CONCURRENT_BATCHES: usize = 10;

/// Default HTTP request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Default capacity of the pending event queue.
pub const DEFAULT_MAX_PENDING_EVENTS: usize = 1000;

/// Default capacity of the response queue.
pub const DEFAULT_MAX_PENDING_RESPONSES: usize = 2000;
