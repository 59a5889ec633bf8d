//! End-to-end dispatch tests against a running server.

use serde_json::Value;
use std::time::{Duration, Instant};

mod common;

#[tokio::test]
async fn test_accounts_succeeds() {
    let server = common::start_server(common::test_config(2)).await;

    let res = common::client()
        .get(server.url("/ddogsvc/accounts"))
        .send()
        .await
        .expect("server unreachable");

    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-type"], "application/json");
    assert!(res.headers().contains_key("x-request-id"));

    let json: Value = res.json().await.unwrap();
    assert_eq!(json["code"], "200000");
    assert_eq!(json["data"], "Succeeded");
    let latency = json["latency"].as_str().unwrap();
    let ms: f64 = latency.trim_end_matches(" ms").parse().unwrap();
    assert!((0.0..2000.0).contains(&ms), "latency {latency}");

    server.stop().await;
}

#[tokio::test]
async fn test_slow_handler_gets_timeout_within_deadline() {
    let server = common::start_server(common::test_config(2)).await;

    let started = Instant::now();
    let res = common::client()
        .get(server.url("/ddogsvc/accounts?latency=5"))
        .send()
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(res.status(), 504);
    assert_eq!(res.text().await.unwrap(), "timeout");
    assert!(elapsed >= Duration::from_secs(2), "answered after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(4), "answered after {elapsed:?}");

    server.stop().await;
}

#[tokio::test]
async fn test_domain_error_status_and_body() {
    let server = common::start_server(common::test_config(2)).await;

    let res = common::client()
        .get(server.url("/ddogsvc/customers?status_code=403"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 403);
    let json: Value = res.json().await.unwrap();
    assert_eq!(json["code"], "403000");
    assert_eq!(json["message"], "Customers error - Forbidden resource");

    server.stop().await;
}

#[tokio::test]
async fn test_request_id_round_trips() {
    let server = common::start_server(common::test_config(2)).await;

    let res = common::client()
        .get(server.url("/ddogsvc/accounts"))
        .header("x-request-id", "probe-42")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "probe-42");

    server.stop().await;
}

#[tokio::test]
async fn test_concurrent_requests_are_independent() {
    let server = common::start_server(common::test_config(2)).await;
    let client = common::client();

    let slow = client.get(server.url("/ddogsvc/customers?latency=5")).send();
    let fast = client.get(server.url("/ddogsvc/accounts?status_code=400")).send();
    let (slow, fast) = tokio::join!(slow, fast);

    assert_eq!(slow.unwrap().status(), 504);
    assert_eq!(fast.unwrap().status(), 400);

    server.stop().await;
}
