// SPDX-License-Identifier: MIT OR Apache-2.0

//! Example: Failover across search hosts
//!
//! This example runs the client against a scripted transport to show:
//! - Failover from a broken host to the next candidate
//! - Down hosts being skipped by later calls
//! - Waiting for an indexing task to be published
//! - Launched operations with completion callbacks
//!
//! Run with `RUST_LOG=search_api=debug` to see the host health transitions.

use search_api_rs::runtime::LoggingConfig;
use search_api_rs::testkit::{MockReply, MockTransport};
use search_api_rs::{ClientConfig, Command, HostConfig, SearchClient, TaskCreated, Transport};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "search_api=debug".into()),
        )
        .init();

    let transport = Arc::new(MockTransport::new());
    transport
        .always("demo-dsn.search-api.net", MockReply::status(503))
        .always("demo.search-api.net", MockReply::ok(r#"{"taskID":42}"#))
        .always(
            "demo-1.searchnet.com",
            MockReply::ok(r#"{"hits":[{"objectID":"1"}],"nbHits":1}"#)
                .after(Duration::from_millis(50)),
        )
        .push("demo-1.searchnet.com", MockReply::ok(r#"{"status":"notPublished"}"#))
        .push("demo-1.searchnet.com", MockReply::ok(r#"{"status":"published"}"#));

    // ==========================================================================
    // 1. Configuration
    // ==========================================================================
    println!("=== Configuration ===");

    let config = ClientConfig::builder("demo", "demo-key")
        .hosts(vec![
            HostConfig::read("demo-dsn.search-api.net"),
            HostConfig::write("demo.search-api.net"),
            HostConfig::any("demo-1.searchnet.com"),
        ])
        .read_timeout(Duration::from_secs(2))
        .task_poll_interval(Duration::from_millis(200))
        .logging(LoggingConfig::verbose())
        .build()?;
    println!("Config: {:?}", config);

    let client = SearchClient::new(config, Arc::clone(&transport) as Arc<dyn Transport>)?;

    // ==========================================================================
    // 2. Write and wait
    // ==========================================================================
    println!("\n=== Write and Wait ===");

    let write = Command::write(http::Method::POST, "/1/indexes/products")
        .with_json_body(&json!({"objectID": "1", "name": "Desk lamp"}))?;
    let created: TaskCreated = client.execute(&write).await?;
    println!("Created task {}", created.task_id);

    let status = client
        .wait_for_task(&created.task_ref("products"), Some(Duration::from_secs(5)))
        .await?;
    println!("Task state: {:?}", status.state);

    // ==========================================================================
    // 3. Launched queries
    // ==========================================================================
    println!("\n=== Launched Queries ===");

    let handles: Vec<_> = (0..3)
        .map(|page| {
            client.launch::<Value, _>(
                Command::get("/1/indexes/products/query").with_query("page", page.to_string()),
                move |result| match result {
                    Ok(body) => println!("page {page}: {} hits", body["nbHits"]),
                    Err(e) => println!("page {page} failed: {e}"),
                },
            )
        })
        .collect();
    for handle in handles {
        let _ = handle.wait().await;
    }

    // ==========================================================================
    // 4. Host health
    // ==========================================================================
    println!("\n=== Host Health ===");

    for host in client.pool().hosts() {
        println!(
            "{:<28} up={:<5} failures={}",
            host.endpoint(),
            host.is_up(),
            host.failure_count()
        );
    }

    let metrics = client.metrics();
    println!(
        "Attempts: {} total, {} ok, {} timed out, success rate {:.0}%",
        metrics.total_attempts(),
        metrics.successful_attempts(),
        metrics.timed_out_attempts(),
        metrics.success_rate() * 100.0
    );

    Ok(())
}
