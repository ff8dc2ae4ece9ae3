//! End-to-end tests through a real listener and the client.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use request_gateway::client::GatewayClient;
use request_gateway::lifecycle::spawn_with_context;
use request_gateway::pipeline::{HitSink, HttpExecutor, HttpRequest, Pipeline, ProxySettings};
use request_gateway::rpc::ServerContext;
use request_gateway::config::ExecutorConfig;

mod common;

#[tokio::test]
async fn test_cache_hit_then_evict_on_default_port() {
    let executor = Arc::new(common::CountingExecutor::default());
    let (handle, hits) = common::start_gateway(10101, executor.clone(), Duration::ZERO).await;
    let client = GatewayClient::new("127.0.0.1:10101");
    let request = HttpRequest::get("http://x/a");
    let none = ProxySettings::new();

    let first = client.request(&request, &none, None).await.unwrap();
    assert_eq!(executor.calls(), 1);
    assert_eq!(hits.text(), "");

    let second = client.request(&request, &none, None).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(executor.calls(), 1);
    assert_eq!(hits.text(), "HIT GET http://x/a\n");

    assert_eq!(client.evict(&["http://x/a"]).await.unwrap(), 1);
    let third = client.request(&request, &none, None).await.unwrap();
    assert_eq!(executor.calls(), 2);
    assert_ne!(third.body, first.body);
    assert_eq!(hits.text(), "HIT GET http://x/a\n");

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_clear_makes_every_url_miss() {
    let executor = Arc::new(common::CountingExecutor::default());
    let (handle, _hits) = common::start_gateway(0, executor.clone(), Duration::ZERO).await;
    let client = GatewayClient::new(handle.local_addr().to_string());
    let none = ProxySettings::new();

    for url in ["http://x/a", "http://x/b", "http://y/c"] {
        client.request(&HttpRequest::get(url), &none, None).await.unwrap();
    }
    assert_eq!(executor.calls(), 3);

    client.clear_cache().await.unwrap();
    for url in ["http://x/a", "http://x/b", "http://y/c"] {
        client.request(&HttpRequest::get(url), &none, None).await.unwrap();
    }
    assert_eq!(executor.calls(), 6);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_real_executor_hits_backend_once() {
    let (backend, backend_hits) = common::start_mock_backend("payload").await;
    let captured = common::Captured::default();
    let executor = Arc::new(HttpExecutor::new(&ExecutorConfig::default()).unwrap());
    let pipeline = Pipeline::new(
        executor,
        Duration::from_millis(10),
        HitSink::from_writer(captured.clone()),
    );
    let handle = spawn_with_context(
        &common::loopback_config(0),
        Arc::new(ServerContext::new(pipeline)),
    )
    .await
    .unwrap();
    let client = GatewayClient::new(handle.local_addr().to_string());

    let url = format!("http://{backend}/a");
    let request = HttpRequest::get(&url);
    let none = ProxySettings::new();

    let first = client.request(&request, &none, Some(Duration::from_secs(5))).await.unwrap();
    let second = client.request(&request, &none, Some(Duration::from_secs(5))).await.unwrap();

    assert_eq!(first.status, 200);
    assert_eq!(first.text(), "payload");
    assert_eq!(first, second);
    assert_eq!(backend_hits.load(Ordering::SeqCst), 1);
    assert_eq!(captured.text(), format!("HIT GET {url}\n"));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_post_shape_is_cached_separately() {
    let executor = Arc::new(common::CountingExecutor::default());
    let (handle, hits) = common::start_gateway(0, executor.clone(), Duration::ZERO).await;
    let client = GatewayClient::new(handle.local_addr().to_string());
    let none = ProxySettings::new();

    let post = HttpRequest::post("http://x/api/submit", b"title=hi".to_vec());
    client.request(&HttpRequest::get("http://x/api/submit"), &none, None).await.unwrap();
    client.request(&post, &none, None).await.unwrap();
    client.request(&post, &none, None).await.unwrap();

    assert_eq!(executor.calls(), 2);
    assert_eq!(hits.text(), "HIT POST http://x/api/submit\n");

    // Eviction covers both shapes of the URL.
    assert_eq!(client.evict(&["http://x/api/submit/"]).await.unwrap(), 2);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_same_domain_spacing_across_clients() {
    let interval = Duration::from_millis(200);
    let executor = Arc::new(common::CountingExecutor::default());
    let (handle, _hits) = common::start_gateway(0, executor.clone(), interval).await;
    let address = handle.local_addr().to_string();

    let mut tasks = Vec::new();
    for i in 0..4 {
        let client = GatewayClient::new(address.clone());
        tasks.push(tokio::spawn(async move {
            let request = HttpRequest::get(format!("http://api.test/item/{i}"));
            client.request(&request, &ProxySettings::new(), None).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let mut starts = executor.start_times("api.test");
    starts.sort();
    assert_eq!(starts.len(), 4);
    for pair in starts.windows(2) {
        assert!(pair[1] - pair[0] >= interval);
    }

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_distinct_domains_are_not_spaced() {
    let interval = Duration::from_secs(3);
    let executor = Arc::new(common::CountingExecutor::default());
    let (handle, _hits) = common::start_gateway(0, executor.clone(), interval).await;
    let address = handle.local_addr().to_string();

    let mut tasks = Vec::new();
    for host in ["one.test", "two.test"] {
        let client = GatewayClient::new(address.clone());
        tasks.push(tokio::spawn(async move {
            let request = HttpRequest::get(format!("http://{host}/"));
            client.request(&request, &ProxySettings::new(), None).await
        }));
    }
    let all = tokio::time::timeout(Duration::from_secs(2), async {
        for task in tasks {
            task.await.unwrap().unwrap();
        }
    })
    .await;
    assert!(all.is_ok(), "calls to different domains must not wait on each other");
    assert_eq!(executor.calls(), 2);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_multi_megabyte_body_round_trips() {
    let body: Vec<u8> = (0..6 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
    let executor = Arc::new(common::FixedBodyExecutor::new(body.clone()));
    let (handle, _hits) = common::start_gateway(0, executor.clone(), Duration::ZERO).await;
    let client = GatewayClient::new(handle.local_addr().to_string());
    let request = HttpRequest::get("http://big.test/blob");

    let started = std::time::Instant::now();
    for _ in 0..2 {
        let response = tokio::time::timeout(
            Duration::from_secs(30),
            client.request(&request, &ProxySettings::new(), None),
        )
        .await
        .expect("large response should arrive promptly")
        .unwrap();
        assert_eq!(response.body.len(), body.len());
        assert!(response.body == body);
    }
    assert!(started.elapsed() < Duration::from_secs(30));
    assert_eq!(executor.calls(), 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cache_hit_skips_rate_limit_wait() {
    let interval = Duration::from_secs(5);
    let executor = Arc::new(common::CountingExecutor::default());
    let (handle, hits) = common::start_gateway(0, executor.clone(), interval).await;
    let client = GatewayClient::new(handle.local_addr().to_string());
    let request = HttpRequest::get("http://slow.test/a");
    let none = ProxySettings::new();

    client.request(&request, &none, None).await.unwrap();
    assert_eq!(executor.calls(), 1);

    let started = std::time::Instant::now();
    client.request(&request, &none, None).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(executor.calls(), 1);
    assert_eq!(hits.text(), "HIT GET http://slow.test/a\n");

    handle.shutdown().await.unwrap();
}
