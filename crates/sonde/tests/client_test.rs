//! Integration tests for client construction and shared state.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use sonde::{Client, ClientConfig, Error};
use sonde_testing::{ConfigBuilder, MockIngest};

#[tokio::test]
async fn rejects_invalid_configuration() {
    let invalid_hosts = ["", "not a url", "ftp://example.com", "/relative"];
    for host in invalid_hosts {
        let err = Client::new(ClientConfig::new("key", "dataset").with_api_host(host)).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { name: "api_host", .. }), "{host}: {err}");
    }

    let err = Client::new(ClientConfig::new("key", "dataset").with_sample_rate(0)).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { name: "sample_rate", .. }));

    let config = ClientConfig { max_concurrent_batches: 0, ..ClientConfig::new("key", "dataset") };
    let err = Client::new(config).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { name: "max_concurrent_batches", .. }));
}

#[test]
fn requires_tokio_runtime() {
    let err = Client::new(ClientConfig::new("key", "dataset")).unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
}

#[tokio::test]
async fn empty_routing_is_accepted_until_send() -> Result<()> {
    let client = Client::new(ClientConfig::new("", ""))?;

    let result = client.send_now([("k", 1)]).await;
    assert_eq!(result, Err(Error::MissingWriteKey));

    client.set_write_key("key");
    assert_eq!(client.send_field_now("k", 1).await, Err(Error::MissingDataset));

    client.close().await;
    Ok(())
}

#[tokio::test]
async fn setters_validate_like_construction() -> Result<()> {
    let client = Client::new(ClientConfig::new("key", "dataset"))?;

    assert!(client.set_api_host("gopher://example.com").is_err());
    assert!(client.set_sample_rate(0).is_err());
    assert_eq!(client.api_host(), sonde::config::DEFAULT_API_HOST);
    assert_eq!(client.sample_rate(), 1);

    client.set_api_host("http://localhost:9999")?;
    client.set_sample_rate(5)?;
    assert_eq!(client.api_host(), "http://localhost:9999");
    assert_eq!(client.sample_rate(), 5);
    assert_eq!(client.write_key(), "key");
    assert_eq!(client.dataset(), "dataset");

    client.close().await;
    Ok(())
}

#[tokio::test]
async fn clones_share_state() -> Result<()> {
    let client = Client::new(ClientConfig::new("key", "dataset"))?;
    let other = client.clone();

    other.add_field("shared", true)?;
    assert_eq!(client.global_fields().get("shared"), Some(&json!(true)));

    other.close().await;
    assert!(client.is_closed());
    assert_eq!(client.send_field_now("k", 1).await, Err(Error::ClientClosed));
    Ok(())
}

#[tokio::test]
async fn empty_field_names_are_rejected() -> Result<()> {
    let client = Client::new(ClientConfig::new("key", "dataset"))?;

    assert!(matches!(client.add_field("", 1), Err(Error::InvalidArgument { name: "name", .. })));
    assert!(client.add_dynamic_field("", || json!(1)).is_err());
    assert!(client.add_all([("ok", 1), ("", 2)]).is_err());
    assert!(client.global_fields().is_empty());

    client.close().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn send_now_delivers_globals_and_data() -> Result<()> {
    let ingest = MockIngest::start().await;
    let client = Client::new(ConfigBuilder::new(ingest.url()).workers(2).build())?;
    client.add_field("host", "web-1")?;
    client.add_dynamic_field("pid", || json!(4242))?;

    client.send_now([("latency_ms", json!(12.5)), ("tags", json!(["a", "b"]))]).await?;
    client.send_field_now("single", "value").await?;

    let events = ingest.wait_for_events(2, Duration::from_secs(5)).await?;
    client.close().await;

    let with_latency = events.iter().find(|e| e.field("latency_ms").is_some()).expect("latency event");
    assert_eq!(with_latency.fields, json!({"host": "web-1", "pid": 4242, "latency_ms": 12.5, "tags": "[\"a\",\"b\"]"}));

    let single = events.iter().find(|e| e.field("single").is_some()).expect("single event");
    assert_eq!(single.field("host"), Some(&json!("web-1")));

    let responses: Vec<_> = client.responses().try_iter().collect();
    assert_eq!(responses.len(), 2);
    Ok(())
}

#[tokio::test]
async fn response_stream_ends_after_close() -> Result<()> {
    use futures::StreamExt;

    let ingest = MockIngest::start().await;
    let client = Client::new(ConfigBuilder::new(ingest.url()).workers(1).build())?;

    for i in 0..3 {
        client.send_field_now("i", i).await?;
    }
    client.close().await;

    let collected: Vec<_> = client.responses().stream().collect().await;
    assert_eq!(collected.len(), 3);
    Ok(())
}
